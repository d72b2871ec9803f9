//! sockshare demo - starts several consumers against one URL
//!
//! With `SOCKSHARE_SHARE=true` all consumers ride a single connection; each
//! sends a greeting before the connection is open and logs what comes back.

#[cfg(not(target_arch = "wasm32"))]
mod config;

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    use std::rc::Rc;

    use sockshare_client::ws::{
        LocalTokioScheduler, SocketEnv, SocketRegistries, WebSocketClient,
    };
    use sockshare_client::ws::transport::TungsteniteConnector;
    use sockshare_client::{HeartbeatOptions, Options};
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sockshare_client=debug,sockshare_demo=info")),
        )
        .init();

    let config = config::DemoConfig::from_env()?;
    tracing::info!(
        "Starting {} consumer(s) for {} (share: {})",
        config.consumers,
        config.url,
        config.share
    );

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            let scheduler = Rc::new(LocalTokioScheduler);
            let env = SocketEnv::new(
                SocketRegistries::new(),
                Rc::new(TungsteniteConnector::new(scheduler.clone())),
                scheduler,
            );

            let clients: Vec<WebSocketClient> = (0..config.consumers)
                .map(|index| {
                    let options = Options::new()
                        .share(config.share)
                        .always_reconnect()
                        .reconnect_attempts(5)
                        .heartbeat(HeartbeatOptions::default())
                        .on_open(move |event| tracing::info!("[{}] open {}", index, event.url))
                        .on_close(move |event| {
                            tracing::info!("[{}] closed ({} {})", index, event.code, event.reason)
                        })
                        .on_reconnect_stop(move |budget| {
                            tracing::warn!("[{}] gave up after {} attempts", index, budget)
                        });
                    let client = WebSocketClient::connect(env.clone(), config.url.as_str(), options);
                    client.on_message(move |message| {
                        tracing::info!("[{}] <- {:?}", index, message.data);
                    });
                    client
                })
                .collect();

            for (index, client) in clients.iter().enumerate() {
                client.send(format!("hello from consumer {}", index))?;
            }

            tokio::time::sleep(config.run_for).await;

            for client in &clients {
                client.close()?;
            }
            // Let the close frames go out.
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            anyhow::Ok(())
        })
        .await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
