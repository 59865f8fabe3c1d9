//! Trip coordinator: turns a traveller's message into specialist requests
//! and merges the specialists' replies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as Days, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{flight, hotel};
use crate::agent::{Agent, AgentCore};
use crate::config::CoordinatorSettings;
use crate::error::Result;
use crate::memory::ConversationMemory;
use crate::protocol::{into_payload, payload_status, Envelope, Payload};
use crate::tools::Tool;

pub const AGENT_NAME: &str = "trip-coordinator";
pub const TRIP_PLANNING: &str = "trip_planning";

const FLIGHT_KEYWORDS: [&str; 6] = ["flight", "fly", "plane", "travel to", "go to", "trip to"];
const HOTEL_KEYWORDS: [&str; 4] = ["hotel", "stay", "accommodation", "room"];
const DESTINATION_STOPWORDS: [&str; 10] =
    ["next", "tomorrow", "today", "on", "for", "in", "this", "with", "from", "stay"];

/// What a traveller asked for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripPlan {
    pub needs_flights: bool,
    pub needs_hotels: bool,
    pub trip_type: TripType,
    pub origin: String,
    pub destination: Option<String>,
    pub departure_date: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TripType {
    Leisure,
    Romantic,
    Business,
    Family,
}

impl std::fmt::Display for TripType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TripType::Leisure => write!(f, "leisure"),
            TripType::Romantic => write!(f, "romantic"),
            TripType::Business => write!(f, "business"),
            TripType::Family => write!(f, "family"),
        }
    }
}

impl TripType {
    fn detect(message: &str) -> Self {
        if ["romantic", "honeymoon", "anniversary"].iter().any(|k| message.contains(k)) {
            TripType::Romantic
        } else if ["business", "conference", "meeting"].iter().any(|k| message.contains(k)) {
            TripType::Business
        } else if ["family", "kids", "children"].iter().any(|k| message.contains(k)) {
            TripType::Family
        } else {
            TripType::Leisure
        }
    }
}

impl TripPlan {
    /// Keyword extraction over `message`, with dates relative to `today`.
    pub fn extract(message: &str, default_origin: &str, today: NaiveDate) -> Self {
        let lowered = message.to_lowercase();

        let departure = if lowered.contains("tomorrow") {
            Some(today + Days::days(1))
        } else if lowered.contains("next week") {
            Some(today + Days::days(7))
        } else {
            None
        };

        Self {
            needs_flights: FLIGHT_KEYWORDS.iter().any(|k| lowered.contains(k)),
            needs_hotels: HOTEL_KEYWORDS.iter().any(|k| lowered.contains(k)),
            trip_type: TripType::detect(&lowered),
            origin: default_origin.to_string(),
            destination: extract_destination(&lowered),
            departure_date: departure.map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }
}

/// Words after the last standalone "to" (or else "in"), up to the first stopword.
fn extract_destination(message: &str) -> Option<String> {
    ["to", "in"]
        .iter()
        .find_map(|preposition| words_after(message, preposition))
}

fn words_after(message: &str, preposition: &str) -> Option<String> {
    let re = Regex::new(&format!(r"\b{}\s+", preposition)).ok()?;
    let last = re.find_iter(message).last()?;

    let words: Vec<&str> = message[last.end()..]
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .take_while(|w| !w.is_empty() && !DESTINATION_STOPWORDS.contains(w))
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Extracts a [`TripPlan`] from `{message, defaultOrigin?}`.
pub struct TripPlanningTool {
    default_origin: String,
}

impl TripPlanningTool {
    pub fn new(default_origin: impl Into<String>) -> Self {
        Self {
            default_origin: default_origin.into(),
        }
    }
}

#[async_trait]
impl Tool for TripPlanningTool {
    fn name(&self) -> &str {
        TRIP_PLANNING
    }

    fn description(&self) -> &str {
        "Analyze a travel request and decide which specialists to involve"
    }

    async fn execute(&self, params: Payload) -> Result<Payload> {
        let message = params.get("message").and_then(Value::as_str).unwrap_or_default();
        let origin = params
            .get("defaultOrigin")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_origin);

        let plan = TripPlan::extract(message, origin, Utc::now().date_naive());
        Ok(into_payload(serde_json::to_value(plan)?))
    }
}

/// Front-line agent that delegates to the flight and hotel specialists over A2A.
pub struct TripCoordinator {
    core: AgentCore,
    flight_agent: String,
    hotel_agent: String,
    response_timeout: Duration,
}

impl TripCoordinator {
    pub fn new(settings: &CoordinatorSettings) -> Self {
        let tools: Vec<Arc<dyn Tool>> =
            vec![Arc::new(TripPlanningTool::new(settings.default_origin.clone()))];
        Self {
            core: AgentCore::new(
                AGENT_NAME,
                "Plans trips by coordinating specialist agents",
                tools,
                Some(Box::new(ConversationMemory::with_capacity(
                    settings.memory_capacity,
                ))),
            ),
            flight_agent: flight::AGENT_NAME.to_string(),
            hotel_agent: hotel::AGENT_NAME.to_string(),
            response_timeout: Duration::from_secs(settings.response_timeout_seconds),
        }
    }

    /// Route flight requests to another agent name.
    pub fn with_flight_agent(mut self, name: impl Into<String>) -> Self {
        self.flight_agent = name.into();
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    async fn plan(&self, message: &str, conversation_id: Option<String>) -> Result<Payload> {
        let plan: TripPlan = serde_json::from_value(Value::Object(
            self.core
                .use_tool(TRIP_PLANNING, into_payload(json!({ "message": message })))
                .await?,
        ))?;

        if !plan.needs_flights && !plan.needs_hotels {
            return Ok(into_payload(json!({
                "status": "info",
                "message": "I can help you plan trips. Tell me where and when you'd like to fly or stay.",
                "suggestions": [
                    "Find flights to Paris next week",
                    "Find a hotel in Rome tomorrow",
                    "Plan a romantic trip with flight and hotel to Lisbon",
                ],
            })));
        }

        let Some(destination) = plan.destination.clone() else {
            return Ok(into_payload(json!({
                "status": "info",
                "message": "Where would you like to go?",
                "plan": plan,
            })));
        };

        let departure_date = plan
            .departure_date
            .clone()
            .unwrap_or_else(|| (Utc::now().date_naive() + Days::days(7)).format("%Y-%m-%d").to_string());

        // Both requests are in flight at once; each reply resolves its own wait.
        let flights = async {
            if !plan.needs_flights {
                return None;
            }
            let reply = self
                .core
                .send_request_and_wait(
                    &self.flight_agent,
                    "search_flights",
                    json!({
                        "origin": plan.origin,
                        "destination": destination,
                        "departureDate": departure_date,
                        "tripType": plan.trip_type,
                    }),
                    conversation_id.clone(),
                    self.response_timeout,
                )
                .await;
            Some(reply)
        };
        let hotels = async {
            if !plan.needs_hotels {
                return None;
            }
            let reply = self
                .core
                .send_request_and_wait(
                    &self.hotel_agent,
                    "search_hotels",
                    json!({
                        "destination": destination,
                        "checkIn": departure_date,
                        "tripType": plan.trip_type,
                    }),
                    conversation_id.clone(),
                    self.response_timeout,
                )
                .await;
            Some(reply)
        };
        let (flights, hotels) = tokio::join!(flights, hotels);

        Ok(synthesize(&plan, flights, hotels))
    }
}

fn listed(reply: &Payload, key: &str) -> usize {
    reply.get(key).and_then(Value::as_array).map(Vec::len).unwrap_or(0)
}

/// Merge the specialists' replies into a traveller-facing answer.
///
/// `None` means the specialist was not asked.
fn synthesize(plan: &TripPlan, flights: Option<Payload>, hotels: Option<Payload>) -> Payload {
    let mut results = Payload::new();
    if let Some(flights) = &flights {
        results.insert("flights".to_string(), Value::Object(flights.clone()));
    }
    if let Some(hotels) = &hotels {
        results.insert("hotels".to_string(), Value::Object(hotels.clone()));
    }

    let timed_out = [&flights, &hotels]
        .into_iter()
        .flatten()
        .any(|reply| payload_status(reply) == Some("timeout"));
    if timed_out {
        return into_payload(json!({
            "status": "partial",
            "message": "I found some information, but some services are running slowly. Here's what I have so far:",
            "plan": plan,
            "results": results,
        }));
    }

    let succeeded = |reply: &Option<Payload>| {
        reply
            .as_ref()
            .filter(|reply| payload_status(reply) == Some("success"))
            .cloned()
    };
    let mut parts = Vec::new();
    let mut next_actions = Vec::new();

    if let Some(flights) = succeeded(&flights) {
        let found = listed(&flights, "flights");
        if found > 0 {
            parts.push(format!("I found {} flight options for your trip.", found));
            let range = flights
                .get("priceAnalysis")
                .filter(|analysis| analysis.get("status") == Some(&json!("success")))
                .and_then(|analysis| analysis.get("priceRange"));
            if let Some(range) = range {
                let min = range.get("min").and_then(Value::as_f64).unwrap_or(0.0);
                let max = range.get("max").and_then(Value::as_f64).unwrap_or(0.0);
                parts.push(format!("Prices range from ${:.0} to ${:.0}.", min, max));
            }
            next_actions.push("Select a flight");
        }
    }

    if let Some(hotels) = succeeded(&hotels) {
        let found = listed(&hotels, "hotels");
        if found > 0 {
            let lead = if parts.is_empty() { "I found" } else { "I also found" };
            parts.push(format!("{} {} hotel options in your destination.", lead, found));
            next_actions.push("Select a hotel");
        }
    }

    if parts.is_empty() {
        return into_payload(json!({
            "status": "no_results",
            "message": "I'm having trouble finding options right now. Please try again in a moment.",
            "plan": plan,
            "results": results,
            "suggestions": ["Try different dates", "Check a nearby airport"],
        }));
    }

    next_actions.push("Refine the search");
    into_payload(json!({
        "status": "success",
        "message": parts.join(" "),
        "plan": plan,
        "results": results,
        "nextActions": next_actions,
    }))
}

#[async_trait]
impl Agent for TripCoordinator {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(&self, request: Payload) -> Result<Payload> {
        let message = request
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let conversation_id = request
            .get("conversationId")
            .and_then(Value::as_str)
            .map(str::to_string);

        self.core.memory().await.add_message("user", &message, None);

        let response = {
            let _processing = self.core.processing();
            match self.plan(&message, conversation_id).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!("Trip planning failed: {}", e);
                    into_payload(json!({
                        "status": "error",
                        "message": format!("I encountered an error while planning your trip: {}", e),
                    }))
                }
            }
        };

        let reply = response.get("message").and_then(Value::as_str).unwrap_or_default();
        self.core.memory().await.add_message("assistant", reply, None);

        Ok(response)
    }

    async fn process_a2a_request(&self, envelope: &Envelope) -> Result<Payload> {
        self.core.memory().await.add_message(
            "system",
            &format!("A2A request from {}", envelope.from_agent),
            None,
        );

        let mut request = match envelope.payload.get("parameters") {
            Some(Value::Object(parameters)) => parameters.clone(),
            _ => envelope.payload.clone(),
        };
        if let Some(conversation_id) = &envelope.conversation_id {
            request
                .entry("conversationId")
                .or_insert_with(|| Value::String(conversation_id.clone()));
        }
        self.process_request(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentStatus;
    use crate::protocol::{AgentEvent, ChannelSink, MessageType};
    use std::collections::HashMap;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    #[test]
    fn test_extract_flight_plan() {
        let plan = TripPlan::extract("I want a romantic flight to Paris next week", "NYC", today());

        assert!(plan.needs_flights);
        assert_eq!(plan.trip_type, TripType::Romantic);
        assert_eq!(plan.origin, "NYC");
        assert_eq!(plan.destination.as_deref(), Some("paris"));
        assert_eq!(plan.departure_date.as_deref(), Some("2024-03-17"));
    }

    #[test]
    fn test_extract_uses_last_to() {
        let plan = TripPlan::extract("I need to go to New York tomorrow.", "BOS", today());

        assert_eq!(plan.destination.as_deref(), Some("new york"));
        assert_eq!(plan.departure_date.as_deref(), Some("2024-03-11"));
        assert_eq!(plan.trip_type, TripType::Leisure);
    }

    #[test]
    fn test_extract_general_query() {
        let plan = TripPlan::extract("What's the weather like?", "NYC", today());

        assert!(!plan.needs_flights);
        assert!(plan.destination.is_none());
        assert!(plan.departure_date.is_none());
    }

    #[test]
    fn test_plan_wire_shape() {
        let plan = TripPlan::extract("Business flight to Berlin", "NYC", today());
        let value = serde_json::to_value(&plan).unwrap();

        assert_eq!(value["needsFlights"], json!(true));
        assert_eq!(value["tripType"], json!("business"));
        assert_eq!(value["destination"], json!("berlin"));
    }

    #[tokio::test]
    async fn test_general_query_gets_info() {
        let coordinator = TripCoordinator::new(&CoordinatorSettings::default());

        let response = coordinator
            .process_request(into_payload(json!({"message": "hello there"})))
            .await
            .unwrap();

        assert_eq!(response["status"], json!("info"));
        let memory = coordinator.core().memory().await;
        let roles: Vec<String> = memory.context().into_iter().map(|t| t.role).collect();
        assert_eq!(roles, vec!["user", "assistant"]);
    }

    #[tokio::test]
    async fn test_flight_request_is_sent_and_times_out() {
        let coordinator = TripCoordinator::new(&CoordinatorSettings::default())
            .with_response_timeout(Duration::from_millis(50));
        let (sink, mut rx) = ChannelSink::channel();
        coordinator.core().subscribe(Arc::new(sink)).await;

        let response = coordinator
            .process_request(into_payload(json!({
                "message": "Find a flight to Lisbon tomorrow",
                "conversationId": "trip-7",
            })))
            .await
            .unwrap();

        assert_eq!(response["status"], json!("partial"));
        assert_eq!(coordinator.status(), AgentStatus::Idle);
        assert_eq!(coordinator.core().pending_count().await, 0);

        let request = match rx.recv().await.unwrap() {
            AgentEvent::Message(envelope) => envelope,
            other => panic!("unexpected event {:?}", other),
        };
        assert_eq!(request.message_type, MessageType::Request);
        assert_eq!(request.to_agent, flight::AGENT_NAME);
        assert_eq!(request.conversation_id.as_deref(), Some("trip-7"));
        assert_eq!(request.payload["action"], json!("search_flights"));
        assert_eq!(request.payload["parameters"]["destination"], json!("lisbon"));
        assert_eq!(request.payload["parameters"]["origin"], json!("NYC"));
    }

    #[test]
    fn test_synthesize_success_message() {
        let plan = TripPlan::extract("flight to Rome", "NYC", today());
        let flights = into_payload(json!({
            "status": "success",
            "flights": [{"price": "200"}, {"price": "150"}],
            "priceAnalysis": {
                "status": "success",
                "priceRange": {"min": 150.0, "max": 200.0, "average": 175.0},
            },
        }));

        let response = synthesize(&plan, Some(flights), None);

        assert_eq!(response["status"], json!("success"));
        assert_eq!(
            response["message"],
            json!("I found 2 flight options for your trip. Prices range from $150 to $200.")
        );
    }

    #[test]
    fn test_synthesize_error_reply() {
        let plan = TripPlan::extract("flight to Rome", "NYC", today());
        let response = synthesize(
            &plan,
            Some(into_payload(json!({"status": "error", "message": "down"}))),
            None,
        );

        assert_eq!(response["status"], json!("no_results"));
        assert_eq!(response["results"]["flights"]["message"], json!("down"));
        assert!(response["results"].get("hotels").is_none());
    }

    #[test]
    fn test_synthesize_keeps_hotels_when_flights_fail() {
        let plan = TripPlan::extract("flight and hotel to Rome", "NYC", today());
        let response = synthesize(
            &plan,
            Some(into_payload(json!({"status": "error", "message": "down"}))),
            Some(into_payload(json!({"status": "success", "hotels": [{"price": 90}]}))),
        );

        assert_eq!(response["status"], json!("success"));
        assert_eq!(response["message"], json!("I found 1 hotel options in your destination."));
        assert_eq!(response["nextActions"], json!(["Select a hotel", "Refine the search"]));
    }

    #[test]
    fn test_synthesize_one_timeout_is_partial() {
        let plan = TripPlan::extract("flight and hotel to Rome", "NYC", today());
        let response = synthesize(
            &plan,
            Some(into_payload(json!({"status": "success", "flights": [{"price": 90}]}))),
            Some(into_payload(json!({"status": "timeout"}))),
        );

        assert_eq!(response["status"], json!("partial"));
        assert_eq!(response["results"]["flights"]["flights"][0]["price"], json!(90));
        assert_eq!(response["results"]["hotels"]["status"], json!("timeout"));
    }

    #[test]
    fn test_extract_hotel_plan() {
        let plan = TripPlan::extract("Find a family hotel in Rome next week", "NYC", today());

        assert!(plan.needs_hotels);
        assert!(!plan.needs_flights);
        assert_eq!(plan.trip_type, TripType::Family);
        assert_eq!(plan.destination.as_deref(), Some("rome"));

        let stay = TripPlan::extract("I want to stay in Lisbon", "NYC", today());
        assert!(stay.needs_hotels);
        assert_eq!(stay.destination.as_deref(), Some("lisbon"));
    }

    async fn next_request(rx: &mut tokio::sync::mpsc::UnboundedReceiver<AgentEvent>) -> Envelope {
        loop {
            if let AgentEvent::Message(envelope) = rx.recv().await.unwrap() {
                return envelope;
            }
        }
    }

    #[tokio::test]
    async fn test_hotel_only_request_skips_flights() {
        let coordinator = TripCoordinator::new(&CoordinatorSettings::default())
            .with_response_timeout(Duration::from_millis(50));
        let (sink, mut rx) = ChannelSink::channel();
        coordinator.core().subscribe(Arc::new(sink)).await;

        let response = coordinator
            .process_request(into_payload(json!({"message": "Find a romantic hotel in Venice tomorrow"})))
            .await
            .unwrap();

        assert_eq!(response["status"], json!("partial"));
        assert!(response["results"].get("flights").is_none());

        let request = next_request(&mut rx).await;
        assert_eq!(request.to_agent, hotel::AGENT_NAME);
        assert_eq!(request.payload["action"], json!("search_hotels"));
        assert_eq!(request.payload["parameters"]["destination"], json!("venice"));
        assert_eq!(request.payload["parameters"]["tripType"], json!("romantic"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fan_out_merges_replies_arriving_out_of_order() {
        let coordinator = Arc::new(
            TripCoordinator::new(&CoordinatorSettings::default())
                .with_response_timeout(Duration::from_secs(5)),
        );
        let (sink, mut rx) = ChannelSink::channel();
        coordinator.core().subscribe(Arc::new(sink)).await;

        let planning = tokio::spawn({
            let coordinator = coordinator.clone();
            async move {
                coordinator
                    .process_request(into_payload(json!({
                        "message": "Book a flight and a hotel to Paris tomorrow",
                        "conversationId": "trip-9",
                    })))
                    .await
            }
        });

        // Both requests go out before either specialist answers.
        let mut requests = HashMap::new();
        for _ in 0..2 {
            let request = next_request(&mut rx).await;
            requests.insert(request.to_agent.clone(), request);
        }
        let flight_request = &requests[flight::AGENT_NAME];
        let hotel_request = &requests[hotel::AGENT_NAME];
        assert_eq!(flight_request.conversation_id.as_deref(), Some("trip-9"));
        assert_eq!(hotel_request.conversation_id.as_deref(), Some("trip-9"));
        assert_eq!(
            hotel_request.payload["parameters"]["checkIn"],
            flight_request.payload["parameters"]["departureDate"]
        );
        assert_eq!(coordinator.core().pending_count().await, 2);

        coordinator
            .handle_a2a_message(hotel_request.create_response(
                hotel::AGENT_NAME,
                into_payload(json!({
                    "status": "success",
                    "hotels": [{"price": "120"}, {"price": "90"}, {"price": "300"}],
                })),
            ))
            .await;
        assert_eq!(coordinator.core().pending_count().await, 1);

        coordinator
            .handle_a2a_message(flight_request.create_response(
                flight::AGENT_NAME,
                into_payload(json!({
                    "status": "success",
                    "flights": [{"price": "200"}, {"price": "150"}],
                    "priceAnalysis": {
                        "status": "success",
                        "priceRange": {"min": 150.0, "max": 200.0, "average": 175.0},
                    },
                })),
            ))
            .await;

        let response = planning.await.unwrap().unwrap();
        assert_eq!(response["status"], json!("success"));
        assert_eq!(
            response["message"],
            json!("I found 2 flight options for your trip. Prices range from $150 to $200. I also found 3 hotel options in your destination.")
        );
        assert_eq!(response["results"]["hotels"]["hotels"].as_array().unwrap().len(), 3);
        assert_eq!(response["results"]["flights"]["flights"].as_array().unwrap().len(), 2);
        assert_eq!(coordinator.core().pending_count().await, 0);
        assert_eq!(coordinator.status(), AgentStatus::Idle);
    }
}
