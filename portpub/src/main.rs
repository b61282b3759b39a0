// External crates
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use portpub_config::{ConfigLoader, EngineConfig};
use portpub_core::{pp_error, pp_error_hint, pp_println, pp_success, pp_warning, tracing_init};
use tracing::debug;

// Internal imports
use portpub::{render, ContainerRecord, Exposure, PortError, PortSpec, StateStore};

#[derive(Parser)]
#[command(name = "portpub")]
#[command(about = "Container port publication and host port allocation")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Register a container and publish its ports
    Run {
        /// Container id
        container: String,
        /// Publish spec, e.g. "9876:80", "8000-8080:80/udp", "127.0.0.1::80"
        #[arg(short = 'p', long = "publish")]
        publish: Vec<String>,
        /// Expose a container port without publishing it, e.g. "443" or "53/udp"
        #[arg(long)]
        expose: Vec<String>,
        /// Publish every exposed port to an ephemeral host port
        #[arg(short = 'P', long = "publish-all")]
        publish_all: bool,
    },
    /// List port mappings of a container
    Port {
        /// Container id
        container: String,
        /// Container port, e.g. "80" or "53/udp"
        port: Option<String>,
    },
    /// List containers and their ports
    Ps {
        /// Print the raw state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove containers and release their host ports
    Rm {
        /// Container ids
        #[arg(required = true)]
        containers: Vec<String>,
        /// Ignore containers that do not exist
        #[arg(short, long)]
        force: bool,
    },
    /// Verify that stored bindings and the port pool agree
    Check,
}

fn main() -> Result<()> {
    tracing_init::init()?;
    let args = Args::parse();

    let config = ConfigLoader::new().load()?;
    let store = StateStore::new(ConfigLoader::state_file(&config)?);
    debug!(state_file = %store.path().display(), "using state file");

    match args.command {
        Command::Run {
            container,
            publish,
            expose,
            publish_all,
        } => handle_run(&config, &store, container, &publish, &expose, publish_all),
        Command::Port { container, port } => {
            handle_port(&config, &store, &container, port.as_deref())
        }
        Command::Ps { json } => handle_ps(&store, json),
        Command::Rm { containers, force } => handle_rm(&config, &store, &containers, force),
        Command::Check => handle_check(&config, &store),
    }
}

fn handle_run(
    config: &EngineConfig,
    store: &StateStore,
    container: String,
    publish: &[String],
    expose: &[String],
    publish_all: bool,
) -> Result<()> {
    let mut specs = Vec::new();
    for raw in publish {
        specs.extend(PortSpec::parse_list(raw)?);
    }

    let mut exposed = expose
        .iter()
        .map(|raw| Exposure::parse(raw))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for spec in &specs {
        let exposure = Exposure {
            range: spec.container_range,
            protocol: spec.protocol,
        };
        if !exposed.contains(&exposure) {
            exposed.push(exposure);
        }
    }

    if publish_all {
        // Explicit -p mappings take precedence over publish-all.
        let automatic = PortSpec::publish_all(&exposed, &specs);
        specs.extend(automatic);
    }

    let result = store.update(|snapshot| {
        if snapshot.containers.contains_key(&container) {
            bail!("Conflict: container {} already exists", container);
        }
        let mapper = snapshot.mapper(config)?;
        let bindings = mapper.publish(&container, &specs)?;
        snapshot.containers.insert(
            container.clone(),
            ContainerRecord::new(exposed, bindings.clone()),
        );
        Ok(bindings)
    });

    match result {
        Ok(bindings) => {
            debug!(container = %container, bindings = bindings.len(), "container registered");
            pp_println!("{}", container);
            Ok(())
        }
        Err(e) => {
            pp_error!("Error: {}", e);
            match e.downcast_ref::<PortError>() {
                Some(PortError::PortUnavailable { .. }) => {
                    pp_error_hint!(
                        "Choose another host port or omit it to allocate one automatically"
                    );
                }
                Some(port_err) if !port_err.is_user_error() => {
                    pp_error_hint!("Stored port state looks damaged; run `portpub check`");
                }
                _ => {}
            }
            std::process::exit(1);
        }
    }
}

fn handle_port(
    config: &EngineConfig,
    store: &StateStore,
    container: &str,
    port: Option<&str>,
) -> Result<()> {
    let snapshot = store.load()?;
    if !snapshot.containers.contains_key(container) {
        pp_error!("Error: No such container: {}", container);
        std::process::exit(1);
    }
    let mapper = snapshot.mapper(config)?;

    let lines = match port {
        Some(arg) => {
            let (port, protocol) = render::parse_port_query(arg)?;
            let protocol = protocol.unwrap_or_default();
            let bindings = mapper.query_one(container, port, protocol)?;
            if bindings.is_empty() {
                pp_error!(
                    "Error: No public port '{}/{}' published for {}",
                    port,
                    protocol,
                    container
                );
                std::process::exit(1);
            }
            render::port_lines(&bindings)
        }
        None => render::container_lines(&mapper.query_by_container(container, None)?),
    };

    for line in lines {
        pp_println!("{}", line);
    }
    Ok(())
}

fn handle_ps(store: &StateStore, json: bool) -> Result<()> {
    let snapshot = store.load()?;

    if json {
        pp_println!("{}", serde_json::to_string_pretty(&snapshot.containers)?);
        return Ok(());
    }

    pp_println!("{:<20} {:<24} PORTS", "CONTAINER ID", "CREATED");
    for (id, record) in &snapshot.containers {
        pp_println!(
            "{:<20} {:<24} {}",
            id,
            record.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            render::ps_ports(&record.bindings, &record.exposed)
        );
    }
    Ok(())
}

fn handle_rm(
    config: &EngineConfig,
    store: &StateStore,
    containers: &[String],
    force: bool,
) -> Result<()> {
    let removed = store.update(|snapshot| {
        let mapper = snapshot.mapper(config)?;
        let mut removed = Vec::new();
        for id in containers {
            if snapshot.containers.remove(id).is_none() {
                if force {
                    pp_warning!("No such container: {}", id);
                    continue;
                }
                bail!("No such container: {}", id);
            }
            let released = mapper.unpublish(id)?;
            removed.push((id.clone(), released.len()));
        }
        Ok(removed)
    })?;

    for (id, released) in removed {
        debug!(container = %id, released, "container removed");
        pp_println!("{}", id);
    }
    Ok(())
}

fn handle_check(config: &EngineConfig, store: &StateStore) -> Result<()> {
    let snapshot = store.load()?;
    let mapper = snapshot.mapper(config)?;
    mapper.verify_consistency()?;

    let bindings = mapper.bindings()?.len();
    pp_success!(
        "{} container(s), {} binding(s), port pool consistent",
        snapshot.containers.len(),
        bindings
    );
    Ok(())
}
