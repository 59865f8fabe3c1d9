//! Hotel specialist: hotel search ranked for the kind of trip, plus price analysis.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as Days, NaiveDate};
use reqwest::Client;
use serde_json::{json, Value};

use super::coordinator::TripType;
use super::flight::{flight_price, post_search, PriceAnalysisTool, PRICE_ANALYSIS};
use crate::agent::{Agent, AgentCore};
use crate::config::HotelSettings;
use crate::error::{Error, Result};
use crate::memory::ConversationMemory;
use crate::protocol::{into_payload, payload_status, Envelope, Payload};
use crate::tools::Tool;

pub const AGENT_NAME: &str = "hotel-specialist";
pub const HOTEL_SEARCH: &str = "hotel_search";
pub const SUPPORTED_ACTIONS: [&str; 2] = ["search_hotels", "analyze_hotels"];

/// Nights booked when only a check-in date is given.
pub const DEFAULT_NIGHTS: i64 = 3;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A `search_hotels` request.
///
/// Keys the specialist does not interpret stay in `parameters` and reach the
/// backend unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct HotelSearch {
    pub destination: String,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub guests: u64,
    pub rooms: u64,
    pub trip_type: TripType,
    pub parameters: Payload,
}

impl HotelSearch {
    pub fn from_parameters(parameters: Payload) -> Result<Self> {
        let destination = parameters
            .get("destination")
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::other("'destination' must be a non-empty string"))?;

        let check_in = date(&parameters, "checkIn")?;
        let check_out = match date(&parameters, "checkOut")? {
            Some(check_out) => Some(check_out),
            None => check_in.map(|d| d + Days::days(DEFAULT_NIGHTS)),
        };

        let trip_type = parameters
            .get("tripType")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or(TripType::Leisure);

        Ok(Self {
            destination,
            check_in,
            check_out,
            guests: count(&parameters, "guests")?,
            rooms: count(&parameters, "rooms")?,
            trip_type,
            parameters,
        })
    }

    /// Hotel category asked of the backend for this kind of trip.
    pub fn hotel_type(&self) -> Option<&'static str> {
        match self.trip_type {
            TripType::Romantic => Some("luxury"),
            TripType::Business => Some("business"),
            TripType::Family => Some("family"),
            TripType::Leisure => None,
        }
    }

    /// Backend query: the caller's parameters with the normalized fields set.
    pub fn query(&self) -> Payload {
        let mut query = self.parameters.clone();
        query.insert("cityCode".to_string(), json!(self.destination));
        if let Some(check_in) = self.check_in {
            query.insert("checkIn".to_string(), json!(check_in.format(DATE_FORMAT).to_string()));
        }
        if let Some(check_out) = self.check_out {
            query.insert("checkOut".to_string(), json!(check_out.format(DATE_FORMAT).to_string()));
        }
        query.insert("guests".to_string(), json!(self.guests));
        query.insert("rooms".to_string(), json!(self.rooms));
        if let Some(hotel_type) = self.hotel_type() {
            query.insert("hotelType".to_string(), json!(hotel_type));
        }
        query
    }
}

fn date(parameters: &Payload, key: &str) -> Result<Option<NaiveDate>> {
    match parameters.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => NaiveDate::parse_from_str(s, DATE_FORMAT)
            .map(Some)
            .map_err(|e| Error::other(format!("'{}' must be YYYY-MM-DD: {}", key, e))),
        Some(other) => Err(Error::other(format!("'{}' must be a date string, got {}", key, other))),
    }
}

/// Positive count, defaulting to 1. Numeric strings are accepted.
fn count(parameters: &Payload, key: &str) -> Result<u64> {
    let value = match parameters.get(key) {
        None | Some(Value::Null) => return Ok(1),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    };
    value
        .filter(|n| *n > 0)
        .ok_or_else(|| Error::other(format!("'{}' must be a positive integer", key)))
}

/// Requests the hotel specialist understands.
#[derive(Debug, Clone, PartialEq)]
pub enum HotelAction {
    SearchHotels(HotelSearch),
    AnalyzeHotels(Payload),
    Unknown(String),
}

impl HotelAction {
    /// Parse `{action, parameters}`.
    pub fn parse(request: &Payload) -> Result<Self> {
        let action = match request.get("action") {
            Some(Value::String(action)) => action.clone(),
            Some(other) => other.to_string(),
            None => "none".to_string(),
        };
        let parameters = parameters_of(request);

        Ok(match action.as_str() {
            "search_hotels" => HotelAction::SearchHotels(HotelSearch::from_parameters(parameters)?),
            "analyze_hotels" => HotelAction::AnalyzeHotels(parameters),
            _ => HotelAction::Unknown(action),
        })
    }
}

fn parameters_of(request: &Payload) -> Payload {
    match request.get("parameters") {
        Some(Value::Object(map)) => map.clone(),
        _ => Payload::new(),
    }
}

/// Searches hotels through the backend's `/hotel-search` endpoint.
pub struct HotelSearchTool {
    client: Client,
    api_url: String,
    api_key: String,
    timeout: Duration,
}

impl HotelSearchTool {
    pub fn new(settings: &HotelSettings) -> Self {
        Self {
            client: Client::new(),
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().unwrap_or_default(),
            timeout: Duration::from_secs(settings.timeout_seconds),
        }
    }
}

#[async_trait]
impl Tool for HotelSearchTool {
    fn name(&self) -> &str {
        HOTEL_SEARCH
    }

    fn description(&self) -> &str {
        "Search for hotels using the hotel search backend"
    }

    async fn execute(&self, params: Payload) -> Result<Payload> {
        let url = format!("{}/hotel-search", self.api_url);
        let found = post_search(&self.client, &url, &self.api_key, self.timeout, &params, "hotels").await;

        Ok(match found {
            Ok(hotels) => into_payload(json!({
                "status": "success",
                "hotels": hotels,
                "searchCriteria": params,
            })),
            Err(e) => {
                tracing::warn!("Hotel search request failed: {}", e);
                into_payload(json!({
                    "status": "error",
                    "message": e.to_string(),
                    "searchCriteria": params,
                }))
            }
        })
    }
}

fn lowered(hotel: &Value, key: &str) -> String {
    hotel.get(key).and_then(Value::as_str).unwrap_or_default().to_lowercase()
}

fn amenities(hotel: &Value) -> Vec<String> {
    hotel
        .get("amenities")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_lowercase).collect())
        .unwrap_or_default()
}

fn category(hotel: &Value) -> f64 {
    match hotel.get("category") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Unpriced hotels sort after every priced one.
fn sort_price(hotel: &Value) -> f64 {
    let price = flight_price(hotel);
    if price > 0.0 {
        price
    } else {
        f64::MAX
    }
}

fn has_amenity(amenities: &[String], words: &[&str]) -> bool {
    amenities.iter().any(|a| words.iter().any(|w| a.contains(w)))
}

/// How well a hotel suits the trip. Leisure trips score everything 0.
fn trip_score(trip_type: TripType, hotel: &Value) -> u32 {
    let amenities = amenities(hotel);
    let brand = hotel.get("brand").and_then(Value::as_str).unwrap_or_default();
    let mut score = 0;

    match trip_type {
        TripType::Leisure => {}
        TripType::Romantic => {
            if category(hotel) >= 4.0 {
                score += 2;
            }
            if has_amenity(&amenities, &["spa", "wellness"]) {
                score += 2;
            }
            if lowered(hotel, "location").contains("city center") {
                score += 1;
            }
            if ["Four Seasons", "Ritz-Carlton", "St. Regis"].contains(&brand) {
                score += 1;
            }
        }
        TripType::Business => {
            if has_amenity(&amenities, &["business", "conference"]) {
                score += 2;
            }
            if has_amenity(&amenities, &["wifi", "internet"]) {
                score += 1;
            }
            if lowered(hotel, "location").contains("airport") {
                score += 1;
            }
            if ["Hilton", "Marriott", "Hyatt", "InterContinental"].contains(&brand) {
                score += 1;
            }
        }
        TripType::Family => {
            if has_amenity(&amenities, &["pool", "kids"]) {
                score += 2;
            }
            if has_amenity(&amenities, &["family", "connecting"]) {
                score += 1;
            }
            if lowered(hotel, "description").contains("family-friendly") {
                score += 1;
            }
        }
    }
    score
}

/// Best suited first, cheaper first among equals, each tagged with its `tripScore`.
/// Leisure results keep the backend's order.
pub fn rank_hotels(hotels: Vec<Value>, trip_type: TripType) -> Vec<Value> {
    if trip_type == TripType::Leisure {
        return hotels;
    }

    let mut scored: Vec<(u32, f64, Value)> = hotels
        .into_iter()
        .map(|mut hotel| {
            let score = trip_score(trip_type, &hotel);
            if let Value::Object(fields) = &mut hotel {
                fields.insert("tripScore".to_string(), json!(score));
            }
            (score, sort_price(&hotel), hotel)
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.total_cmp(&b.1)));
    scored.into_iter().map(|(_, _, hotel)| hotel).collect()
}

/// Top pick, cheapest and most upscale, as indices into `hotels`.
pub fn recommend_hotels(hotels: &[Value], trip_type: TripType) -> Vec<Value> {
    let mut recommendations = Vec::new();
    if hotels.is_empty() {
        return recommendations;
    }

    recommendations.push(json!({
        "type": "best_value",
        "hotelIndex": 0,
        "title": format!("Perfect for your {} trip", trip_type),
        "reason": format!("Best combination of amenities and location for {} travelers", trip_type),
    }));

    if hotels.len() > 1 {
        let cheapest = first_extreme(hotels, sort_price, |candidate, best| candidate < best);
        recommendations.push(json!({
            "type": "budget_friendly",
            "hotelIndex": cheapest,
            "title": "Budget-friendly option",
            "reason": "Great value for money while still meeting your needs",
        }));
    }

    if hotels.len() > 2 {
        let upscale = first_extreme(hotels, category, |candidate, best| candidate > best);
        recommendations.push(json!({
            "type": "luxury",
            "hotelIndex": upscale,
            "title": "Premium experience",
            "reason": "The most comfortable stay on the list",
        }));
    }

    recommendations
}

/// Index of the first hotel whose key beats every earlier one.
fn first_extreme(hotels: &[Value], key: fn(&Value) -> f64, beats: fn(f64, f64) -> bool) -> usize {
    let mut best = 0;
    for (i, hotel) in hotels.iter().enumerate().skip(1) {
        if beats(key(hotel), key(&hotels[best])) {
            best = i;
        }
    }
    best
}

/// Agent for hotel searches and hotel price analysis.
pub struct HotelSpecialist {
    core: AgentCore,
}

impl HotelSpecialist {
    pub fn new(settings: &HotelSettings, memory_capacity: usize) -> Self {
        Self::with_search_tool(Arc::new(HotelSearchTool::new(settings)), memory_capacity)
    }

    /// Build the specialist around any tool registered as `hotel_search`.
    pub fn with_search_tool(search: Arc<dyn Tool>, memory_capacity: usize) -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![search, Arc::new(PriceAnalysisTool)];
        Self {
            core: AgentCore::new(
                AGENT_NAME,
                "Expert in hotel searches, bookings, and accommodation recommendations",
                tools,
                Some(Box::new(ConversationMemory::with_capacity(memory_capacity))),
            ),
        }
    }

    async fn search_hotels(&self, search: HotelSearch) -> Payload {
        let _processing = self.core.processing();

        match self.run_search(&search).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Hotel search error: {}", e);
                into_payload(json!({
                    "status": "error",
                    "message": format!("Hotel search failed: {}", e),
                    "parameters": search.parameters,
                }))
            }
        }
    }

    async fn run_search(&self, search: &HotelSearch) -> Result<Payload> {
        let mut result = self.core.use_tool(HOTEL_SEARCH, search.query()).await?;
        if payload_status(&result) != Some("success") {
            return Ok(result);
        }

        let hotels = result
            .get("hotels")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let ranked = rank_hotels(hotels, search.trip_type);
        let recommendations = recommend_hotels(&ranked, search.trip_type);

        let stay = match (search.check_in, search.check_out) {
            (Some(check_in), Some(check_out)) => format!(
                " from {} to {}",
                check_in.format(DATE_FORMAT),
                check_out.format(DATE_FORMAT)
            ),
            _ => String::new(),
        };
        self.core.memory().await.add_message(
            "system",
            &format!(
                "Hotel search: {}{}, found {} options",
                search.destination,
                stay,
                ranked.len()
            ),
            None,
        );

        result.insert("hotels".to_string(), Value::Array(ranked));
        result.insert("recommendations".to_string(), Value::Array(recommendations));
        Ok(result)
    }

    async fn analyze_hotels(&self, params: Payload) -> Result<Payload> {
        let _processing = self.core.processing();
        let options = params.get("hotels").cloned().unwrap_or_else(|| json!([]));
        let criteria = params.get("criteria").cloned().unwrap_or_else(|| json!({}));
        self.core
            .use_tool(
                PRICE_ANALYSIS,
                into_payload(json!({ "options": options, "criteria": criteria })),
            )
            .await
    }
}

#[async_trait]
impl Agent for HotelSpecialist {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(&self, request: Payload) -> Result<Payload> {
        let action = match HotelAction::parse(&request) {
            Ok(action) => action,
            Err(e) => {
                return Ok(into_payload(json!({
                    "status": "error",
                    "message": format!("Hotel search failed: invalid parameters: {}", e),
                    "parameters": parameters_of(&request),
                })))
            }
        };

        match action {
            HotelAction::SearchHotels(search) => Ok(self.search_hotels(search).await),
            HotelAction::AnalyzeHotels(params) => self.analyze_hotels(params).await,
            HotelAction::Unknown(action) => Ok(into_payload(json!({
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
        tracing::info!("Processing A2A request: {} from {}", action, envelope.from_agent);
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
