use metrics_exporter_prometheus::PrometheusBuilder;
use mock_service::MockConfig;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Port of the mock shop answering in about 10ms.
#[allow(unused)]
pub const SHOP_PORT: u16 = 3002;

/// Port of a mock shop refusing every login.
#[allow(unused)]
pub const LOCKED_SHOP_PORT: u16 = 3003;

#[allow(unused)]
pub fn shop_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

#[allow(unused)]
pub async fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    let wait = ONCE_LOCK.get().is_none();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
            std::process::exit(1);
        }));

        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(
                "surge=debug,mock_service=info,axum::rejection=trace",
            ))
            .init();

        // Outlives the runtime of whichever test gets here first.
        std::thread::spawn(|| {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                PrometheusBuilder::new()
                    .with_http_listener("0.0.0.0:8002".parse::<SocketAddr>().unwrap())
                    .install()
                    .unwrap();

                let shop = serve(
                    SHOP_PORT,
                    MockConfig::default()
                        .latency(Duration::from_millis(10))
                        .jitter(Duration::from_millis(1)),
                );
                let locked = serve(
                    LOCKED_SHOP_PORT,
                    MockConfig::default()
                        .latency(Duration::from_millis(10))
                        .reject_auth(),
                );
                tokio::join!(shop, locked);
            });
        });
    });

    if wait {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn serve(port: u16, config: MockConfig) {
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    if let Err(err) = mock_service::run(addr, config).await {
        error!("Mock shop on {addr} failed: {err:#}");
    }
}
