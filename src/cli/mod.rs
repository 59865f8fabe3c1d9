//! CLI commands for AgentMesh using clap.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;

use crate::agent::Agent;
use crate::bus::MessageBus;
use crate::config::{get_settings_path, load_settings_or_default, Settings};
use crate::protocol::{into_payload, Payload};
use crate::specialists::{FlightSearchParams, FlightSpecialist, HotelSpecialist, TripCoordinator};

/// AgentMesh - cooperating travel agents over an A2A message bus.
#[derive(Parser)]
#[command(name = "agentmesh")]
#[command(version = "0.1.0")]
#[command(about = "AgentMesh - multi-agent trip planning", long_about = None)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Search flights directly through the flight specialist
    Search {
        /// Origin airport or city code
        origin: String,
        /// Destination airport or city code
        destination: String,
        /// Departure date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Return date (YYYY-MM-DD)
        #[arg(long)]
        return_date: Option<String>,
        #[arg(long)]
        passengers: Option<u32>,
        #[arg(long)]
        cabin_class: Option<String>,
    },

    /// Plan a trip from a free-form message via the trip coordinator
    Plan {
        /// What you want, e.g. "a romantic flight to Paris next week"
        message: String,
        #[arg(long)]
        conversation_id: Option<String>,
    },

    /// List the agents and the tools each one offers
    Agents,

    /// Show the effective configuration
    Config,
}

impl Commands {
    pub async fn run(&self) -> Result<()> {
        let settings = load_settings_or_default();

        match &self.command {
            Command::Search {
                origin,
                destination,
                date,
                return_date,
                passengers,
                cabin_class,
            } => {
                let params = FlightSearchParams {
                    origin: origin.clone(),
                    destination: destination.clone(),
                    departure_date: date.clone(),
                    return_date: return_date.clone(),
                    passengers: *passengers,
                    cabin_class: cabin_class.clone(),
                };
                run_search(&settings, params).await
            }
            Command::Plan {
                message,
                conversation_id,
            } => run_plan(&settings, message, conversation_id.clone()).await,
            Command::Agents => list_agents(&settings).await,
            Command::Config => show_config(&settings),
        }
    }
}

async fn run_search(settings: &Settings, params: FlightSearchParams) -> Result<()> {
    let specialist = FlightSpecialist::new(&settings.flight, settings.memory.capacity);
    let request = into_payload(json!({
        "action": "search_flights",
        "parameters": params,
    }));

    let result = specialist.process_request(request).await?;
    print_payload(&result)
}

/// The coordinator and both specialists, registered on a fresh bus.
async fn assemble(settings: &Settings) -> (Arc<MessageBus>, Arc<TripCoordinator>, Vec<Arc<dyn Agent>>) {
    let bus = MessageBus::new();
    let coordinator = Arc::new(TripCoordinator::new(&settings.coordinator));
    let agents: Vec<Arc<dyn Agent>> = vec![
        coordinator.clone(),
        Arc::new(FlightSpecialist::new(&settings.flight, settings.memory.capacity)),
        Arc::new(HotelSpecialist::new(&settings.hotel, settings.memory.capacity)),
    ];
    for agent in &agents {
        bus.register(agent.clone()).await;
    }
    (bus, coordinator, agents)
}

async fn run_plan(settings: &Settings, message: &str, conversation_id: Option<String>) -> Result<()> {
    let (bus, coordinator, agents) = assemble(settings).await;
    let handle = bus.start();

    for agent in &agents {
        agent.initialize().await;
    }

    let mut request = into_payload(json!({ "message": message }));
    if let Some(id) = conversation_id {
        request.insert("conversationId".to_string(), json!(id));
    }
    let result = coordinator.process_request(request).await;

    bus.shutdown();
    handle.await??;

    print_payload(&result?)
}

async fn list_agents(settings: &Settings) -> Result<()> {
    let (bus, _, _) = assemble(settings).await;
    for name in bus.agent_names().await {
        let Some(agent) = bus.agent(&name).await else {
            continue;
        };
        println!("{} - {}", agent.name(), agent.core().description());
        for (tool, description) in agent.core().describe_tools().await {
            println!("    {:<16} {}", tool, description);
        }
    }
    Ok(())
}

fn show_config(settings: &Settings) -> Result<()> {
    println!("Settings file: {}", get_settings_path()?.display());
    let mut shown = settings.clone();
    for api_key in [&mut shown.flight.api_key, &mut shown.hotel.api_key] {
        if api_key.is_some() {
            *api_key = Some("********".to_string());
        }
    }
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}

fn print_payload(payload: &Payload) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(payload)?);
    Ok(())
}
