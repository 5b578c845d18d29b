use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use flowdeck::actors::PollingFallback;
use flowdeck::client::{HttpOrchestrationClient, InMemoryOrchestrationClient, OrchestrationClient};
use flowdeck::config::Config;
use flowdeck::live::{LiveChannel, WebSocketTransport};
use flowdeck::orchestration::{ControllerEvent, LifecycleController, NotificationLevel};
use flowdeck::workflow::{available_actions, SessionId, Workflow, WorkflowId, WorkflowStatus};
use flowdeck::Result;

/// Flowdeck - build, submit and steer orchestration workflows
#[derive(Parser, Debug)]
#[command(name = "flowdeck")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    FLOWDECK_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.flowdeck/flowdeck.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Use the in-process backend simulation instead of the API
    #[arg(long)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show orchestration status, strategies and agents
    Status,

    /// List example workflow templates
    Templates,

    /// List active workflows
    List,

    /// Plan a workflow from a natural language goal
    Goal {
        /// What the workflow should achieve
        text: String,

        /// Start right away instead of waiting for plan approval
        #[arg(long)]
        no_approval: bool,
    },

    /// Create a workflow from a template
    Template {
        /// Template ID (see `flowdeck templates`)
        id: String,
    },

    /// Approve a workflow's pending plan
    Approve { workflow_id: String },

    /// Reject a workflow's pending plan
    Reject {
        workflow_id: String,

        /// Reason passed to the backend
        #[arg(long)]
        reason: Option<String>,
    },

    /// Start a workflow
    Start { workflow_id: String },

    /// Pause a running workflow
    Pause { workflow_id: String },

    /// Resume a paused workflow
    Resume { workflow_id: String },

    /// Cancel a workflow
    Cancel { workflow_id: String },

    /// Follow live updates until Ctrl-C
    Watch,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    flowdeck::log::init_with_debug(cli.debug);
    if cli.debug {
        tracing::info!("flowdeck starting (debug mode enabled)");
    } else {
        tracing::info!("flowdeck starting");
    }

    let config = Config::load()?;
    let client: Arc<dyn OrchestrationClient> = if cli.offline {
        Arc::new(InMemoryOrchestrationClient::new())
    } else {
        Arc::new(HttpOrchestrationClient::new(
            config.effective_api_url(),
            config.request_timeout(),
        )?)
    };
    let session = SessionId::generate();
    let controller = Arc::new(LifecycleController::new(
        client,
        session,
        config.effective_history_limit(),
    ));

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(run(cli, config, controller.clone()));
    controller.teardown();
    result
}

async fn run(cli: Cli, config: Config, controller: Arc<LifecycleController>) -> Result<()> {
    match cli.command {
        Command::Status => run_status(&controller).await,
        Command::Templates => run_templates(&controller).await,
        Command::List => run_list(&controller).await,
        Command::Goal { text, no_approval } => {
            let require_approval = config.effective_require_approval() && !no_approval;
            let workflow = controller.create_from_goal(&text, require_approval).await?;
            print_workflow(&workflow);
            Ok(())
        }
        Command::Template { id } => {
            let workflow = controller.create_from_template(&id).await?;
            print_workflow(&workflow);
            Ok(())
        }
        Command::Approve { workflow_id } => {
            let id = WorkflowId::new(workflow_id);
            controller.fetch_workflow(&id).await?;
            controller.approve_plan(&id).await?;
            print_after(&controller, &id).await
        }
        Command::Reject {
            workflow_id,
            reason,
        } => {
            let id = WorkflowId::new(workflow_id);
            controller.fetch_workflow(&id).await?;
            controller
                .reject_plan(&id, reason.as_deref().unwrap_or("rejected from CLI"))
                .await?;
            print_after(&controller, &id).await
        }
        Command::Start { workflow_id } => {
            let id = WorkflowId::new(workflow_id);
            controller.fetch_workflow(&id).await?;
            controller.start(&id).await?;
            print_after(&controller, &id).await
        }
        Command::Pause { workflow_id } => {
            let id = WorkflowId::new(workflow_id);
            controller.fetch_workflow(&id).await?;
            controller.pause(&id).await?;
            print_after(&controller, &id).await
        }
        Command::Resume { workflow_id } => {
            let id = WorkflowId::new(workflow_id);
            controller.fetch_workflow(&id).await?;
            controller.resume(&id).await?;
            print_after(&controller, &id).await
        }
        Command::Cancel { workflow_id } => {
            let id = WorkflowId::new(workflow_id);
            controller.fetch_workflow(&id).await?;
            controller.cancel(&id).await?;
            print_after(&controller, &id).await
        }
        Command::Watch => run_watch(&config, controller, cli.offline).await,
    }
}

async fn run_status(controller: &LifecycleController) -> Result<()> {
    let catalog = controller.load_catalog().await?;

    println!();
    println!("Orchestration: {}", catalog.status.status);
    println!("  Active workflows: {}", catalog.status.active_workflows);
    println!("  Available agents: {}", catalog.status.available_agents);
    if let Some(uptime) = catalog.status.uptime_secs {
        println!("  Uptime:           {}s", uptime);
    }
    println!();
    println!("Strategies:");
    for strategy in &catalog.strategies {
        println!("  {:<14} {}", strategy.name.to_string(), strategy.description);
    }
    println!();
    println!("Agents:");
    for (agent, capabilities) in &catalog.agents {
        println!("  {:<14} {}", agent, capabilities.join(", "));
    }
    Ok(())
}

async fn run_templates(controller: &LifecycleController) -> Result<()> {
    let catalog = controller.load_catalog().await?;
    if catalog.templates.is_empty() {
        println!("No templates available");
        return Ok(());
    }
    for template in &catalog.templates {
        let approval = if template.requires_approval {
            " (requires approval)"
        } else {
            ""
        };
        println!("{:<16} {}{}", template.id, template.name, approval);
        println!(
            "{:<16} {} step(s), {}",
            "",
            template.steps.len(),
            template.strategy
        );
    }
    Ok(())
}

async fn run_list(controller: &LifecycleController) -> Result<()> {
    controller.refresh_active().await?;
    let workflows = controller.active_workflows().await;
    if workflows.is_empty() {
        println!("No active workflows");
        return Ok(());
    }
    for workflow in &workflows {
        println!(
            "{:<12} {:<28} {} step(s)  {}",
            workflow.id.as_str(),
            format_status(workflow.status),
            workflow.steps.len(),
            workflow.goal.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Keep the live channel and the poller running, printing controller events.
async fn run_watch(config: &Config, controller: Arc<LifecycleController>, offline: bool) -> Result<()> {
    let mut events = controller.subscribe();

    let channel = if offline {
        None
    } else {
        let transport = Arc::new(WebSocketTransport::new(&config.effective_ws_url()));
        let channel = LiveChannel::new(transport, controller.clone())
            .with_reconnect_interval(config.reconnect_interval());
        let mut states = channel.watch_state();
        tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                println!("live channel: {:?}", state);
            }
        });
        channel.connect(controller.session().clone());
        Some(channel)
    };
    let poller = PollingFallback::new(controller.clone())
        .with_interval(config.poll_interval())
        .spawn();

    println!("Watching session {} (Ctrl-C to stop)", controller.session());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event printer lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Some(channel) = channel {
        channel.disconnect();
    }
    poller.shutdown();
    Ok(())
}

async fn print_after(controller: &LifecycleController, id: &WorkflowId) -> Result<()> {
    if let Some(workflow) = controller.workflow(id).await {
        print_workflow(&workflow);
    }
    Ok(())
}

fn print_workflow(workflow: &Workflow) {
    println!();
    println!("  Workflow ID: {}", workflow.id);
    println!("  Status:      {}", format_status(workflow.status));
    println!("  Strategy:    {}", workflow.strategy);
    if let Some(goal) = &workflow.goal {
        println!("  Goal:        {}", goal);
    }
    println!(
        "  Created:     {}",
        workflow.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    if let Some(plan) = workflow.pending_approval() {
        println!("Plan awaiting approval: {}", plan.summary);
        if let Some(secs) = plan.estimated_duration_secs {
            println!("  Estimated duration: {}s", secs);
        }
        println!("  Highest risk:       {:?}", plan.max_risk());
        for (i, step) in plan.steps.iter().enumerate() {
            println!("  {}. [{:?}] {}", i + 1, step.risk_level, step.description);
        }
        println!();
    } else {
        for step in &workflow.steps {
            println!("  {:<10} {:<18} {}", step.id, format!("{:?}", step.status), step.description);
        }
        println!();
    }

    let actions: Vec<String> = available_actions(workflow.status)
        .iter()
        .map(|a| format!("{:?}", a))
        .collect();
    if !actions.is_empty() {
        println!("Available: {}", actions.join(", "));
    }
}

fn print_event(event: &ControllerEvent) {
    match event {
        ControllerEvent::WorkflowUpdated { id, status } => {
            println!("{:<12} {}", id.as_str(), format_status(*status));
        }
        ControllerEvent::WorkflowArchived { id, status } => {
            println!("{:<12} {} (finished)", id.as_str(), format_status(*status));
        }
        ControllerEvent::SelectionChanged { .. } => {}
        ControllerEvent::HealthUpdated => println!("system health updated"),
        ControllerEvent::CatalogLoaded => {}
        ControllerEvent::Notification(n) => match n.level {
            NotificationLevel::Error => eprintln!("\x1b[31merror:\x1b[0m {}", n.message),
            NotificationLevel::Info => println!("{}", n.message),
        },
    }
}

/// Format workflow status with color codes for terminal.
fn format_status(status: WorkflowStatus) -> String {
    match status {
        WorkflowStatus::Completed => format!("\x1b[32m{}\x1b[0m", status), // Green
        WorkflowStatus::Failed => format!("\x1b[31m{}\x1b[0m", status),    // Red
        WorkflowStatus::Running => format!("\x1b[33m{}\x1b[0m", status),   // Yellow
        WorkflowStatus::Paused => format!("\x1b[34m{}\x1b[0m", status),    // Blue
        WorkflowStatus::PendingApproval => format!("\x1b[36m{}\x1b[0m", status), // Cyan
        WorkflowStatus::Cancelled => format!("\x1b[90m{}\x1b[0m", status), // Gray
    }
}
