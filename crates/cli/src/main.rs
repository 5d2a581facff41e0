//! OpCom CLI - campaign orchestration from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use opcom_aar::AarAggregator;
use opcom_agents::{
    AgentRoster, CommandExecutor, ManifestDecomposer, RoundRobinPlanner, TemplateSynthesizer,
};
use opcom_core::{AgentProfile, Campaign, CampaignId};
use opcom_execution::{
    CampaignIntake, CampaignScheduler, MissionScheduler, SchedulerConfig, SignalHub, TaskRunner,
};
use opcom_storage::{JsonStorage, Storage};

#[derive(Parser)]
#[command(name = "opcom")]
#[command(about = "Hierarchical campaign orchestration", long_about = None)]
struct Cli {
    /// Storage directory
    #[arg(long, default_value = ".opcom")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a draft campaign
    New {
        /// Campaign name
        name: String,
        /// Commander's intent
        #[arg(long)]
        intent: String,
        /// Desired end state
        #[arg(long)]
        end_state: String,
        /// Detailed description
        #[arg(long, default_value = "")]
        description: String,
        /// Things the campaign must do (repeatable)
        #[arg(long = "constraint")]
        constraints: Vec<String>,
        /// Things the campaign must not do (repeatable)
        #[arg(long = "restraint")]
        restraints: Vec<String>,
        /// Barrier timeout in minutes
        #[arg(long)]
        timeout_minutes: Option<u64>,
    },
    /// Decompose and plan a draft campaign
    Commission {
        /// Campaign ID
        id: String,
        /// Plan manifest (CampaignPlan JSON)
        #[arg(long)]
        plan: PathBuf,
        /// Roster file (JSON array of agent profiles)
        #[arg(long)]
        agents: Option<PathBuf>,
    },
    /// Execute a ready campaign
    Run {
        /// Campaign ID
        id: String,
        /// Command each task is delegated to
        #[arg(long, default_value = "echo")]
        agent_cmd: String,
        /// Roster file (JSON array of agent profiles)
        #[arg(long)]
        agents: Option<PathBuf>,
    },
    /// Show campaign status
    Status {
        /// Campaign ID
        id: String,
    },
    /// Show the audit log
    Log {
        /// Campaign ID
        id: String,
    },
    /// Show the campaign after-action review
    Aar {
        /// Campaign ID
        id: String,
    },
    /// List campaigns
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let storage: Arc<dyn Storage> = Arc::new(JsonStorage::new(&cli.data_dir).await?);

    match cli.command {
        Commands::New {
            name,
            intent,
            end_state,
            description,
            constraints,
            restraints,
            timeout_minutes,
        } => {
            let mut campaign = Campaign::new(name, intent, end_state)
                .with_description(description)
                .with_constraints(constraints)
                .with_restraints(restraints);
            campaign.timeout_minutes = timeout_minutes;
            storage.save_campaign(&campaign).await?;
            println!("Created campaign: {} - {}", campaign.id, campaign.name);
        }
        Commands::Commission { id, plan, agents } => {
            let campaign_id = parse_id(&id)?;
            let roster = load_roster(agents).await?;
            let intake = CampaignIntake::new(
                storage.clone(),
                Arc::new(ManifestDecomposer::new(plan)),
                Arc::new(RoundRobinPlanner),
                roster,
            );
            intake.analyze(campaign_id).await?;

            let missions = storage.list_missions(campaign_id).await?;
            println!("Campaign {id} is ready ({} missions)", missions.len());
        }
        Commands::Run {
            id,
            agent_cmd,
            agents,
        } => {
            let campaign_id = parse_id(&id)?;
            let roster = load_roster(agents).await?;
            let signals = SignalHub::new();
            let config = SchedulerConfig::default();

            let runner = Arc::new(
                TaskRunner::new(
                    storage.clone(),
                    Arc::new(CommandExecutor::new(agent_cmd)),
                    roster,
                )
                .with_result_cap(config.result_cap),
            );
            let aar = Arc::new(AarAggregator::new(
                storage.clone(),
                Arc::new(TemplateSynthesizer),
            ));
            let missions = Arc::new(MissionScheduler::new(
                storage.clone(),
                runner,
                aar.clone(),
                signals.clone(),
            ));
            let scheduler =
                CampaignScheduler::new(storage.clone(), missions, aar, signals).with_config(config);

            info!(campaign = %campaign_id, "dispatching campaign");
            scheduler.run(campaign_id).await?;

            let campaign = storage
                .load_campaign(campaign_id)
                .await?
                .context("campaign vanished mid-run")?;
            println!(
                "Campaign {} settled {} (cost ${:.4}, {} tokens)",
                campaign.name, campaign.status, campaign.total_cost_usd, campaign.total_tokens
            );
        }
        Commands::Status { id } => {
            let campaign_id = parse_id(&id)?;
            let Some(campaign) = storage.load_campaign(campaign_id).await? else {
                println!("Campaign not found");
                return Ok(());
            };

            println!("Campaign: {} - {}", campaign.id, campaign.name);
            println!("  Status: {}", campaign.status);
            println!("  Progress: {}%", campaign.progress);
            println!("  Cost: ${:.4}", campaign.total_cost_usd);
            println!("  Tokens: {}", campaign.total_tokens);
            for mission in storage.list_missions(campaign_id).await? {
                println!(
                    "  [{}] {} | {} | ${:.4}",
                    mission.sequence, mission.name, mission.status, mission.total_cost_usd
                );
                for task in storage.list_tasks(mission.id).await? {
                    println!(
                        "    [{}] {} {} | {} | {}",
                        task.sequence,
                        task.task_verb,
                        task.name,
                        task.status,
                        task.assigned_agent.as_deref().unwrap_or("-"),
                    );
                }
            }
        }
        Commands::Log { id } => {
            let campaign_id = parse_id(&id)?;
            for event in storage.list_events(campaign_id).await? {
                println!("{} {} {}", event.timestamp, event.event, event.message);
            }
        }
        Commands::Aar { id } => {
            let campaign_id = parse_id(&id)?;
            let Some(campaign) = storage.load_campaign(campaign_id).await? else {
                println!("Campaign not found");
                return Ok(());
            };
            match campaign.aar {
                Some(aar) => println!("{}", serde_json::to_string_pretty(&aar)?),
                None => println!("No after-action review yet"),
            }
        }
        Commands::List => {
            for campaign in storage.list_campaigns().await? {
                println!(
                    "{} | {} | {} | {}%",
                    campaign.id, campaign.status, campaign.name, campaign.progress
                );
            }
        }
    }

    Ok(())
}

fn parse_id(id: &str) -> Result<CampaignId> {
    id.parse()
        .map_err(|_| anyhow::anyhow!("invalid campaign ID: {id}"))
}

/// Load the roster file, or fall back to a single generalist.
async fn load_roster(path: Option<PathBuf>) -> Result<AgentRoster> {
    let Some(path) = path else {
        return Ok(AgentRoster::new(vec![AgentProfile {
            slug: "generalist".to_string(),
            name: "Generalist".to_string(),
            description: "handles any task".to_string(),
            tools: Vec::new(),
        }]));
    };
    let json = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading roster {}", path.display()))?;
    let profiles: Vec<AgentProfile> =
        serde_json::from_str(&json).with_context(|| format!("parsing roster {}", path.display()))?;
    Ok(AgentRoster::new(profiles))
}
