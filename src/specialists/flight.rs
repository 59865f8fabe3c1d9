//! Flight specialist: flight search backed by an HTTP service, plus price analysis.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use crate::agent::{Agent, AgentCore};
use crate::config::FlightSettings;
use crate::error::{Error, Result};
use crate::memory::ConversationMemory;
use crate::protocol::{into_payload, payload_status, Envelope, Payload};
use crate::tools::Tool;

pub const AGENT_NAME: &str = "flight-specialist";
pub const FLIGHT_SEARCH: &str = "flight_search";
pub const PRICE_ANALYSIS: &str = "price_analysis";
pub const SUPPORTED_ACTIONS: [&str; 2] = ["search_flights", "analyze_prices"];

/// Typed search criteria for callers that build a request themselves.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlightSearchParams {
    pub origin: String,
    pub destination: String,
    pub departure_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passengers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cabin_class: Option<String>,
}

/// A `search_flights` request.
///
/// `parameters` is forwarded to the search tool exactly as received; only the
/// route is read out of it.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightSearch {
    pub origin: String,
    pub destination: String,
    pub parameters: Payload,
}

impl FlightSearch {
    pub fn from_parameters(parameters: Payload) -> Result<Self> {
        let text = |key: &str| -> Result<String> {
            parameters
                .get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| Error::other(format!("'{}' must be a non-empty string", key)))
        };

        let origin = text("origin")?;
        let destination = text("destination")?;
        Ok(Self {
            origin,
            destination,
            parameters,
        })
    }
}

/// Requests the flight specialist understands.
#[derive(Debug, Clone, PartialEq)]
pub enum FlightAction {
    SearchFlights(FlightSearch),
    AnalyzePrices(Payload),
    Unknown(String),
}

impl FlightAction {
    /// Parse `{action, parameters}`.
    pub fn parse(request: &Payload) -> Result<Self> {
        let action = match request.get("action") {
            Some(Value::String(action)) => action.clone(),
            Some(other) => other.to_string(),
            None => "none".to_string(),
        };
        let parameters = parameters_of(request);

        Ok(match action.as_str() {
            "search_flights" => FlightAction::SearchFlights(FlightSearch::from_parameters(parameters)?),
            "analyze_prices" => FlightAction::AnalyzePrices(parameters),
            _ => FlightAction::Unknown(action),
        })
    }
}

fn parameters_of(request: &Payload) -> Payload {
    match request.get("parameters") {
        Some(Value::Object(map)) => map.clone(),
        _ => Payload::new(),
    }
}

/// Searches flights through the backend's `/flight-search` endpoint.
///
/// Transport and HTTP failures come back as `status: error` results.
pub struct FlightSearchTool {
    client: Client,
    api_url: String,
    api_key: String,
    timeout: Duration,
}

impl FlightSearchTool {
    pub fn new(settings: &FlightSettings) -> Self {
        Self {
            client: Client::new(),
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().unwrap_or_default(),
            timeout: Duration::from_secs(settings.timeout_seconds),
        }
    }

    async fn search(&self, params: &Payload) -> Result<Vec<Value>> {
        post_search(&self.client, &self.endpoint(), &self.api_key, self.timeout, params, "flights").await
    }

    fn endpoint(&self) -> String {
        format!("{}/flight-search", self.api_url)
    }
}

/// POST `params` to a search backend and read the `list_key` array of its reply.
pub(crate) async fn post_search(
    client: &Client,
    url: &str,
    api_key: &str,
    timeout: Duration,
    params: &Payload,
    list_key: &str,
) -> Result<Vec<Value>> {
    let response = client
        .post(url)
        .header("x-api-key", api_key)
        .timeout(timeout)
        .json(params)
        .send()
        .await?
        .error_for_status()?;

    let body: Value = response.json().await?;
    Ok(body
        .get(list_key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

#[async_trait]
impl Tool for FlightSearchTool {
    fn name(&self) -> &str {
        FLIGHT_SEARCH
    }

    fn description(&self) -> &str {
        "Search for flights using the flight search backend"
    }

    async fn execute(&self, params: Payload) -> Result<Payload> {
        Ok(match self.search(&params).await {
            Ok(flights) => into_payload(json!({
                "status": "success",
                "flights": flights,
                "searchCriteria": params,
            })),
            Err(e) => {
                tracing::warn!("Flight search request failed: {}", e);
                into_payload(json!({
                    "status": "error",
                    "message": e.to_string(),
                    "searchCriteria": params,
                }))
            }
        })
    }
}

/// Price range and best-value pick over a list of flights.
pub struct PriceAnalysisTool;

/// Price of a flight or hotel; accepts numeric strings and numbers, anything else is 0.
pub(crate) fn flight_price(flight: &Value) -> f64 {
    match flight.get("price") {
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[async_trait]
impl Tool for PriceAnalysisTool {
    fn name(&self) -> &str {
        PRICE_ANALYSIS
    }

    fn description(&self) -> &str {
        "Analyze flight prices and provide recommendations"
    }

    async fn execute(&self, params: Payload) -> Result<Payload> {
        // Hotel analysis hands its list over as `options`.
        let flights = params
            .get("flights")
            .or_else(|| params.get("options"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if flights.is_empty() {
            return Ok(into_payload(json!({
                "status": "no_data",
                "message": "No flights to analyze",
            })));
        }

        let prices: Vec<f64> = flights
            .iter()
            .map(flight_price)
            .filter(|price| *price > 0.0)
            .collect();

        if prices.is_empty() {
            return Ok(into_payload(json!({
                "status": "no_prices",
                "message": "No valid price data",
            })));
        }

        let min = prices.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let average = prices.iter().sum::<f64>() / prices.len() as f64;
        let best = flights.iter().position(|f| flight_price(f) == min);

        Ok(into_payload(json!({
            "status": "success",
            "priceRange": { "min": min, "max": max, "average": average },
            "recommendations": [{
                "type": "best_value",
                "flightIndex": best,
                "reason": "Lowest price option",
            }],
        })))
    }
}

/// Agent for flight searches and price analysis.
pub struct FlightSpecialist {
    core: AgentCore,
}

impl FlightSpecialist {
    pub fn new(settings: &FlightSettings, memory_capacity: usize) -> Self {
        Self::with_search_tool(Arc::new(FlightSearchTool::new(settings)), memory_capacity)
    }

    /// Build the specialist around any tool registered as `flight_search`.
    pub fn with_search_tool(search: Arc<dyn Tool>, memory_capacity: usize) -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![search, Arc::new(PriceAnalysisTool)];
        Self {
            core: AgentCore::new(
                AGENT_NAME,
                "Expert in flight searches, bookings, and price analysis",
                tools,
                Some(Box::new(ConversationMemory::with_capacity(memory_capacity))),
            ),
        }
    }

    async fn search_flights(&self, search: FlightSearch) -> Payload {
        let _processing = self.core.processing();

        match self.run_search(&search).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Flight search error: {}", e);
                into_payload(json!({
                    "status": "error",
                    "message": format!("Flight search failed: {}", e),
                    "parameters": search.parameters,
                }))
            }
        }
    }

    /// Search, then analyze prices only when the search found something.
    async fn run_search(&self, search: &FlightSearch) -> Result<Payload> {
        let mut result = self
            .core
            .use_tool(FLIGHT_SEARCH, search.parameters.clone())
            .await?;

        let flights = result
            .get("flights")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if payload_status(&result) != Some("success") || flights.is_empty() {
            return Ok(result);
        }

        let analysis = self
            .core
            .use_tool(
                PRICE_ANALYSIS,
                into_payload(json!({ "flights": flights, "criteria": search.parameters })),
            )
            .await?;
        result.insert("priceAnalysis".to_string(), Value::Object(analysis));

        self.core.memory().await.add_message(
            "system",
            &format!(
                "Flight search: {} to {}, found {} options",
                search.origin,
                search.destination,
                flights.len()
            ),
            None,
        );

        Ok(result)
    }

    async fn analyze_prices(&self, params: Payload) -> Result<Payload> {
        let _processing = self.core.processing();
        self.core.use_tool(PRICE_ANALYSIS, params).await
    }
}

#[async_trait]
impl Agent for FlightSpecialist {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(&self, request: Payload) -> Result<Payload> {
        let action = match FlightAction::parse(&request) {
            Ok(action) => action,
            Err(e) => {
                return Ok(into_payload(json!({
                    "status": "error",
                    "message": format!("Flight search failed: invalid parameters: {}", e),
                    "parameters": parameters_of(&request),
                })))
            }
        };

        match action {
            FlightAction::SearchFlights(search) => Ok(self.search_flights(search).await),
            FlightAction::AnalyzePrices(params) => self.analyze_prices(params).await,
            FlightAction::Unknown(action) => Ok(into_payload(json!({
                "status": "error",
                "message": format!("Unknown action: {}", action),
                "supportedActions": SUPPORTED_ACTIONS,
            }))),
        }
    }

    async fn process_a2a_request(&self, envelope: &Envelope) -> Result<Payload> {
        let action = envelope
            .payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("none");
        self.core.memory().await.add_message(
            "system",
            &format!("A2A request: {} from {}", action, envelope.from_agent),
            None,
        );

        let mut request = Payload::new();
        for key in ["action", "parameters"] {
            if let Some(value) = envelope.payload.get(key) {
                request.insert(key.to_string(), value.clone());
            }
        }
        self.process_request(request).await
    }
}
