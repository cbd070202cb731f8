use crate::domain::PackageError;

/// Status code of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Unknown,
    Done,
    Error,
    Aborted,
}

impl Code {
    pub fn as_i64(self) -> i64 {
        match self {
            Code::Unknown => -1,
            Code::Done => 0,
            Code::Error => 1,
            Code::Aborted => 2,
        }
    }
}

impl TryFrom<i64> for Code {
    type Error = PackageError;

    fn try_from(value: i64) -> Result<Self, PackageError> {
        match value {
            -1 => Ok(Code::Unknown),
            0 => Ok(Code::Done),
            1 => Ok(Code::Error),
            2 => Ok(Code::Aborted),
            other => Err(PackageError::InvalidCode(other.to_string())),
        }
    }
}
