use eyre::Result;
use tokio::task::JoinSet;

use crate::{
    config::Config,
    hardware::{SystemClock, sim},
    policy::PolicyEngine,
    server::ConnectionManager,
    state::StationState,
};

pub async fn launch(config_path: &str, port: Option<u16>) -> Result<()> {
    let mut config = load_config(config_path).await?;

    if let Some(port) = port {
        config.server.port = port;
    }

    let state = StationState::from_config(&config).into_shared();

    // Physical drivers live outside this crate; the in-process simulation
    // stands in for them behind the same hardware traits.
    let (sensors, actuators) = sim::simulated();

    let engine = PolicyEngine::new(
        &config.policy,
        state.clone(),
        sensors.clone(),
        SystemClock,
        actuators,
    );

    let manager =
        ConnectionManager::bind(&config.server, state, sensors, SystemClock).await?;

    tracing::info!("Listening on {}", manager.local_addr()?);

    let mut set = JoinSet::new();
    set.spawn(engine.run());
    set.spawn(manager.run());

    // Both tasks run until the process is stopped.
    set.join_next().await;

    Ok(())
}

async fn load_config(path: &str) -> Result<Config> {
    match tokio::fs::try_exists(path).await? {
        true => Config::load(path).await,

        false => {
            tracing::warn!("No config file at {path}, using defaults");
            Ok(Config::default())
        }
    }
}
