use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use network_status::crd::ClusterOperator;
use network_status::status::{KubeStore, StatusConfig, StatusManager};
use network_status::{controller, telemetry, Error};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Show version and build information
    Version,
    /// Print the conditions currently published on the cluster operator
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Operator namespace
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = "openshift-network-operator")]
    operator_namespace: String,

    /// Name of the ClusterOperator record to publish
    #[arg(long, env = "CLUSTER_OPERATOR_NAME", default_value = "network")]
    cluster_operator_name: String,

    /// Release version workloads must report before the operator is Available
    #[arg(long, env = "RELEASE_VERSION", default_value = "")]
    release_version: String,

    /// Kubeconfig context of a hosted cluster whose workloads are tracked (repeatable)
    #[arg(long = "hosted-context")]
    hosted_contexts: Vec<String>,

    /// Seconds between periodic status passes
    #[arg(long, env = "RESYNC_SECONDS", default_value_t = 300)]
    resync_seconds: u64,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Port for the REST API
    #[cfg(feature = "rest-api")]
    #[arg(long, env = "API_PORT", default_value_t = 8080)]
    api_port: u16,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Name of the ClusterOperator record
    #[arg(long, env = "CLUSTER_OPERATOR_NAME", default_value = "network")]
    cluster_operator_name: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Network Status Operator v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            println!("Rust Version: {}", env!("RUST_VERSION"));
            Ok(())
        }
        Commands::Info(info_args) => run_info(info_args).await,
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

async fn run_info(args: InfoArgs) -> Result<(), Error> {
    let client = Client::try_default().await.map_err(Error::KubeError)?;

    let api: Api<ClusterOperator> = Api::all(client);
    let Some(co) = api.get_opt(&args.cluster_operator_name).await? else {
        println!("ClusterOperator {} does not exist", args.cluster_operator_name);
        return Ok(());
    };

    let status = co.status.unwrap_or_default();
    for condition in &status.conditions {
        println!(
            "{}={} {} {}",
            condition.type_, condition.status, condition.reason, condition.message
        );
    }
    for version in &status.versions {
        println!("version {}={}", version.name, version.version);
    }
    Ok(())
}

/// Build one client per hosted cluster, keyed by its kubeconfig context name
async fn hosted_clients(contexts: &[String]) -> Result<BTreeMap<String, Client>, Error> {
    if contexts.is_empty() {
        return Ok(BTreeMap::new());
    }
    let kubeconfig = Kubeconfig::read()
        .map_err(|e| Error::ConfigError(format!("Failed to read kubeconfig: {}", e)))?;

    let mut clients = BTreeMap::new();
    for context in contexts {
        let options = KubeConfigOptions {
            context: Some(context.clone()),
            ..Default::default()
        };
        let config = kube::Config::from_custom_kubeconfig(kubeconfig.clone(), &options)
            .await
            .map_err(|e| {
                Error::ConfigError(format!("Invalid hosted context {}: {}", context, e))
            })?;
        clients.insert(context.clone(), Client::try_from(config)?);
        info!("Configured hosted cluster {}", context);
    }
    Ok(clients)
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    telemetry::init_tracing(args.log_json);

    info!(
        "Starting Network Status Operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = Client::try_default().await.map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");

    let hosted = hosted_clients(&args.hosted_contexts).await?;

    let mut store = KubeStore::new(client.clone(), &args.cluster_operator_name);
    for (cluster_name, hosted_client) in &hosted {
        store = store.with_hosted_cluster(cluster_name, hosted_client.clone());
    }

    let status = Arc::new(StatusManager::new(
        Arc::new(store),
        StatusConfig {
            cluster_operator_name: args.cluster_operator_name.clone(),
            target_version: args.release_version.clone(),
            ..Default::default()
        },
    ));

    let state = Arc::new(controller::ControllerState {
        client,
        hosted,
        status,
        operator_namespace: args.operator_namespace.clone(),
        resync: Duration::from_secs(args.resync_seconds),
    });

    #[cfg(feature = "rest-api")]
    {
        let api_state = state.clone();
        let port = args.api_port;
        tokio::spawn(async move {
            if let Err(e) = network_status::rest_api::run_server(api_state, port).await {
                tracing::error!("REST API server error: {:?}", e);
            }
        });
    }

    // Run the main controller loop
    let result = controller::run_controller(state).await;

    // Flush any remaining traces
    telemetry::shutdown_telemetry();

    result
}
