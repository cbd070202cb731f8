use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use courier_core::app::{BuildError, Service, ServiceBuilder};
use courier_core::config::RuntimeConfig;
use courier_core::impls::ChannelTransport;
use courier_core::ports::Transport;
use courier_core::queue::SerialQueue;
use courier_core::task::{Settlement, TaskHandle};
use courier_core::typed::{Message, TransportExt};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Ping {
    text: String,
}

impl Message for Ping {
    const SIGNATURE: &'static str = "Ping";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Pong {
    text: String,
}

impl Message for Pong {
    const SIGNATURE: &'static str = "Pong";
}

/// 時間のかかる要求。abort の伝播を見せるためだけに使う
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Crawl {
    depth: u32,
}

impl Message for Crawl {
    const SIGNATURE: &'static str = "Crawl";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Progress {
    percent: u8,
}

impl Message for Progress {
    const SIGNATURE: &'static str = "Progress";
}

/// RUST_LOG が無ければ info で標準出力に出す
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config() -> RuntimeConfig {
    match std::env::args().nth(1) {
        Some(path) => match RuntimeConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "falling back to default config");
                RuntimeConfig::default()
            }
        },
        None => RuntimeConfig::default(),
    }
}

fn attach_service(server: &ChannelTransport) -> Result<Service, BuildError> {
    let service = ServiceBuilder::new("demo")
        .respondent::<Ping, Pong, _>(|ping| {
            TaskHandle::resolved(Pong {
                text: format!("pong: {}", ping.text),
            })
        })?
        .respondent::<Crawl, Pong, _>(|crawl| {
            TaskHandle::spawn(async move {
                tokio::time::sleep(Duration::from_secs(u64::from(crawl.depth))).await;
                Ok(Pong {
                    text: "crawled".to_string(),
                })
            })
        })?
        .expect_requests(&[Ping::SIGNATURE, Crawl::SIGNATURE])
        .attach(server)?;
    Ok(service)
}

#[tokio::main]
async fn main() {
    init_logging();
    let config = load_config();

    // (A) 2 つの Transport をメモリ上で繋ぐ
    let (client, server) = ChannelTransport::in_memory_pair(config.transport.clone());

    // (B) server 側に respondent を取り付ける
    let service = match attach_service(&server) {
        Ok(service) => service,
        Err(err) => {
            tracing::error!(error = %err, "failed to attach demo service");
            return;
        }
    };

    // (C) 型付きの要求
    match client
        .request::<Ping, Pong>(&Ping {
            text: "hello".to_string(),
        })
        .await
    {
        Settlement::Resolved(pong) => tracing::info!(reply = %pong.text, "ping answered"),
        other => tracing::error!(?other, "ping failed"),
    }

    // (D) abort は相手の respondent まで届く
    let crawl = client.request::<Crawl, Pong>(&Crawl { depth: 60 });
    tokio::time::sleep(Duration::from_millis(50)).await;
    crawl.abort(None);
    tracing::info!(settlement = ?crawl.wait().await, "crawl after abort");

    // (E) イベント
    match client.subscribe::<Progress>() {
        Ok(mut progress) => {
            for percent in [10, 60, 100] {
                if let Err(err) = server.notify(&Progress { percent }) {
                    tracing::error!(error = %err, "notify failed");
                }
            }
            for _ in 0..3 {
                if let Some(event) = progress.recv().await {
                    tracing::info!(percent = event.percent, "progress");
                }
            }
        }
        Err(err) => tracing::error!(error = %err, "subscribe failed"),
    }

    // (F) 間隔を空けて 1 つずつ流れるキュー
    let queue = SerialQueue::new(config.queue.clone());
    let steps: Vec<TaskHandle<u32>> = (1..=3)
        .map(|step| {
            queue.wait(async move {
                tracing::info!(step, "queued step running");
                Ok(step)
            })
        })
        .collect();
    for step in steps {
        tracing::info!(settlement = ?step.wait().await, "queued step settled");
    }
    queue.destroy().await;
    tracing::info!(counts = ?queue.counts(), "queue drained");

    service.detach();
    client.destroy();
    server.destroy();
}
