use clap::Parser;
use affinitygate_shell::BoxError;
mod args;
fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let args = args::Args::parse();
    let config = args.to_config();
    config.validate()?;
    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().thread_name(env!("CARGO_PKG_NAME")).build()?;
    rt.block_on(async move {
        match args.feed {
            args::Feed::Static(memory) => affinitygate_shell::startup_static(memory.endpoints, config).await,
            #[cfg(feature = "fs")]
            args::Feed::File(path) => affinitygate_shell::startup_file(path, config).await,
            #[cfg(feature = "k8s")]
            args::Feed::K8s(service) => affinitygate_shell::startup_k8s(service, args.kubeconfig, config).await,
        }
    })
}
