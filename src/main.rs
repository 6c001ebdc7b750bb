use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use stowage::{
    auth::{DefaultKeychain, Keychain},
    cli::{Cli, Commands},
    config::Config,
    registry::{DistributionInspector, RegistryClient},
    swarm::{ServiceMode, ServiceSpec},
    Client, ServiceCreateOptions, ServiceSubmitter,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Create {
            image,
            name,
            replicas,
            env,
            constraints,
            labels,
            spec,
            no_resolve_image,
            with_registry_auth,
            direct_registry,
            args,
        } => {
            let config = load_config(cli.host)?;

            let mut service = match spec {
                Some(path) => read_spec(&path)?,
                None => ServiceSpec::default(),
            };

            if let Some(name) = name {
                service.name = name;
            }
            for label in labels {
                let (key, value) = label.split_once('=').unwrap_or((label.as_str(), ""));
                service.labels.insert(key.to_string(), value.to_string());
            }
            if let Some(replicas) = replicas {
                service.mode = Some(ServiceMode::Replicated {
                    replicas: Some(replicas),
                });
            }
            if !constraints.is_empty() {
                service
                    .task_template
                    .placement
                    .get_or_insert_with(Default::default)
                    .constraints
                    .extend(constraints);
            }

            let container = service
                .task_template
                .container_spec
                .get_or_insert_with(Default::default);
            if let Some(image) = image {
                container.image = image;
            }
            if container.image.is_empty() {
                bail!("An image is required, either as an argument or in the --spec file");
            }
            container.env.extend(env);
            if !args.is_empty() {
                container.args = args;
            }
            let image = container.image.clone();

            let options = ServiceCreateOptions {
                encoded_registry_auth: registry_auth(with_registry_auth, &image)?,
                query_registry: config.query_registry && !no_resolve_image,
            };

            let client = Client::from_config(&config).context("Failed to configure daemon client")?;
            let registry = RegistryClient::new();
            let mut submitter = ServiceSubmitter::new(&client);
            if direct_registry || config.direct_registry {
                debug!("Resolving {} against its registry", image);
                submitter = submitter.with_inspector(&registry);
            }

            info!("Creating service from {}", image);
            match submitter.submit(service, &options).await {
                Ok(response) => {
                    print_warnings(&response.warnings);
                    // Print only the service ID to stdout
                    println!("{}", response.id);
                }
                Err(e) => {
                    print_warnings(&e.response.warnings);
                    return Err(e.into());
                }
            }
        }
        Commands::Inspect {
            image,
            with_registry_auth,
            direct_registry,
        } => {
            let config = load_config(cli.host)?;
            let encoded_auth = registry_auth(with_registry_auth, &image)?;

            let inspect = if direct_registry || config.direct_registry {
                RegistryClient::new()
                    .inspect(&image, encoded_auth.as_deref())
                    .await?
            } else {
                let client =
                    Client::from_config(&config).context("Failed to configure daemon client")?;
                client.inspect(&image, encoded_auth.as_deref()).await?
            };

            println!("{}", serde_json::to_string_pretty(&inspect)?);
        }
        Commands::Version => {
            println!("stowage {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn load_config(host: Option<String>) -> Result<Config> {
    let mut config = Config::load().context("Failed to load configuration")?;
    config.apply_overrides(host, None);
    debug!("Using daemon at {} (API {})", config.host, config.api_version);
    Ok(config)
}

fn read_spec(path: &Path) -> Result<ServiceSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn registry_auth(enabled: bool, image: &str) -> Result<Option<String>> {
    if !enabled {
        return Ok(None);
    }
    let auth = DefaultKeychain::new()
        .resolve(image)
        .with_context(|| format!("Failed to resolve credentials for {}", image))?;
    if auth.is_anonymous() {
        debug!("No credentials found for {}", image);
    }
    Ok(Some(auth.encode()?))
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("{}", warning.trim_end());
    }
}
