//! Controller assembly and subcommand bodies.

use std::path::Path;

use anyhow::{Context, bail};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::{error, info};

use fleetwatch_autoscale::{ActionOutcome, Reconciler};
use fleetwatch_cloud::SimulatedCloud;
use fleetwatch_core::{ConfigOverrides, NodeId, TemplateRef, WatchdogConfig};
use fleetwatch_health::HttpHealthGate;
use fleetwatch_lifecycle::LifecycleManager;
use fleetwatch_proxy::{CommandReloader, TomlFileStore, UpstreamSync};

pub type Controller =
    Reconciler<SimulatedCloud, SimulatedCloud, HttpHealthGate, TomlFileStore, CommandReloader>;

pub fn load_config(path: &Path, check_period: Option<String>) -> anyhow::Result<WatchdogConfig> {
    let overrides = ConfigOverrides { check_period };
    let config = WatchdogConfig::from_file_with(path, &overrides)
        .with_context(|| format!("invalid config {}", path.display()))?;
    info!(path = ?path, "config loaded");
    Ok(config)
}

fn upstream_sync(config: &WatchdogConfig) -> UpstreamSync<TomlFileStore, CommandReloader> {
    UpstreamSync::new(
        TomlFileStore::new(&config.proxy.config_path),
        CommandReloader::new(config.proxy.reload_command.clone()),
        config.proxy.upstream.clone(),
        config.application_port,
    )
}

fn cloud_backend(config: &WatchdogConfig) -> anyhow::Result<SimulatedCloud> {
    let Some(simulation) = &config.simulation else {
        bail!("no cloud backend configured: add a [simulation] section to run against the in-memory cloud");
    };
    info!(
        seeded = simulation.nodes.len(),
        "using simulated cloud backend"
    );
    Ok(SimulatedCloud::seeded(&config.watched_tag, &simulation.nodes))
}

/// Wire every subsystem. Fails if the proxy upstream block is missing.
pub fn build(config: &WatchdogConfig) -> anyhow::Result<Controller> {
    // ── Initialize subsystems ──────────────────────────────────

    let cloud = cloud_backend(config)?;
    let lifecycle = LifecycleManager::new(cloud.clone(), cloud, config);
    info!(node_limit = config.node_limit, "lifecycle manager initialized");

    let upstream = upstream_sync(config);
    upstream.check().with_context(|| {
        format!(
            "proxy config {} has no usable upstream {:?}",
            config.proxy.config_path.display(),
            config.proxy.upstream
        )
    })?;
    info!(upstream = %config.proxy.upstream, "upstream sync initialized");

    let gate = HttpHealthGate::new(config.health.clone());

    Ok(Reconciler::new(lifecycle, gate, upstream, config))
}

pub async fn run(mut controller: Controller) -> anyhow::Result<()> {
    info!("fleetwatch daemon starting");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;

    tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!(error = %e, "failed to listen for SIGINT");
                    return;
                }
            }
            _ = terminate.recv() => {}
            _ = hangup.recv() => {}
        }
        info!("shutdown signal received, finishing current pass");
        let _ = shutdown_tx.send(true);
    });

    controller.run(shutdown_rx).await;

    info!("fleetwatch daemon stopped");
    Ok(())
}

pub async fn once(mut controller: Controller) -> anyhow::Result<()> {
    let report = controller.run_pass().await?;

    println!("running:  {}", report.running);
    println!("stopped:  {}", report.stopped);
    println!("action:   {}", report.action);
    println!("outcome:  {}", describe(&report.outcome));
    for id in &report.admitted {
        println!("admitted: {id}");
    }
    for id in &report.deferred {
        println!("deferred: {id}");
    }
    match &report.upstream {
        Some(stats) => {
            println!("upstream: {} members (reloaded: {})", stats.members.len(), stats.reloaded);
            for member in &stats.members {
                println!("  {member}");
            }
        }
        None => println!("upstream: not updated"),
    }
    Ok(())
}

pub async fn plan(controller: &Controller) -> anyhow::Result<()> {
    let plan = controller.plan().await?;

    println!("running ({}):", plan.snapshot.running.len());
    for node in &plan.snapshot.running {
        println!("  {}  {}", node.id, node.private_address);
    }
    println!("stopped ({}):", plan.snapshot.stopped.len());
    for node in &plan.snapshot.stopped {
        println!("  {}", node.id);
    }
    match plan.overloaded {
        Some(n) => println!("overloaded: {n}"),
        None => println!("overloaded: unknown"),
    }
    if !plan.pending.is_empty() {
        println!("pending ({}):", plan.pending.len());
        for id in &plan.pending {
            println!("  {id}");
        }
    }
    println!("action: {}", plan.action);
    Ok(())
}

pub async fn purge(controller: &Controller, id: &NodeId) -> anyhow::Result<()> {
    if !controller.lifecycle().purge(id).await {
        bail!("node {id} was not terminated");
    }
    println!("purged {id}");
    Ok(())
}

pub fn check_config(config: &WatchdogConfig) -> anyhow::Result<()> {
    upstream_sync(config).check().with_context(|| {
        format!(
            "proxy config {} has no usable upstream {:?}",
            config.proxy.config_path.display(),
            config.proxy.upstream
        )
    })?;

    let template = match &config.template.reference {
        TemplateRef::Id(id) => format!("id {id}"),
        TemplateRef::Name(name) => format!("name {name}"),
    };
    println!("config ok");
    println!("  watched tag:  {}={}", config.watched_tag.key, config.watched_tag.value);
    println!("  node limit:   {}", config.node_limit);
    println!("  template:     {template}");
    println!("  alarm prefix: {}", config.alarm_binding.prefix());
    println!("  check period: {:?}", config.check_period);
    println!("  upstream:     {}", config.proxy.upstream);
    if config.simulation.is_some() {
        println!("  backend:      simulated");
    }
    Ok(())
}

fn describe(outcome: &ActionOutcome) -> String {
    match outcome {
        ActionOutcome::Skipped => "skipped".to_string(),
        ActionOutcome::Launched(id) => format!("launched {id}"),
        ActionOutcome::Stopped(id) => format!("stopped {id}"),
        ActionOutcome::CapacityExhausted => "node limit reached".to_string(),
        ActionOutcome::Failed(reason) => format!("failed: {reason}"),
    }
}
