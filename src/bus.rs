//! In-process message bus that routes envelopes between registered agents.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;

use crate::agent::Agent;
use crate::error::{Error, Result};
use crate::protocol::{AgentEvent, ChannelSink, Envelope};

/// Envelopes kept per conversation.
pub const MAX_TRANSCRIPT: usize = 100;

/// Conversations with no traffic for this long are forgotten.
pub const TRANSCRIPT_TTL: Duration = Duration::from_secs(3600);

/// Transcripts kept at once; the least recently active goes first.
pub const MAX_CONVERSATIONS: usize = 1000;

const DEFAULT_CONVERSATION: &str = "default";

/// Routes every agent's outbound envelopes to the addressed agent.
pub struct MessageBus {
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
    sink: Arc<ChannelSink>,
    inbox: Mutex<Option<UnboundedReceiver<AgentEvent>>>,
    transcripts: Mutex<Transcripts>,
    stop: Notify,
}

#[derive(Default)]
struct Transcripts {
    conversations: HashMap<String, Transcript>,
    ttl: Duration,
    sequence: u64,
}

struct Transcript {
    envelopes: VecDeque<Envelope>,
    touched_at: Instant,
    touched_seq: u64,
}

impl Transcripts {
    fn record(&mut self, key: String, envelope: Envelope) {
        let ttl = self.ttl;
        self.conversations.retain(|conversation, transcript| {
            let live = transcript.touched_at.elapsed() < ttl;
            if !live {
                tracing::debug!("Dropping idle transcript {}", conversation);
            }
            live
        });

        if !self.conversations.contains_key(&key) && self.conversations.len() >= MAX_CONVERSATIONS {
            let oldest = self
                .conversations
                .iter()
                .min_by_key(|(_, transcript)| transcript.touched_seq)
                .map(|(conversation, _)| conversation.clone());
            if let Some(oldest) = oldest {
                self.conversations.remove(&oldest);
            }
        }

        self.sequence += 1;
        let transcript = self.conversations.entry(key).or_insert_with(|| Transcript {
            envelopes: VecDeque::new(),
            touched_at: Instant::now(),
            touched_seq: 0,
        });
        transcript.touched_at = Instant::now();
        transcript.touched_seq = self.sequence;
        transcript.envelopes.push_back(envelope);
        while transcript.envelopes.len() > MAX_TRANSCRIPT {
            transcript.envelopes.pop_front();
        }
    }
}

impl MessageBus {
    pub fn new() -> Arc<Self> {
        Self::with_transcript_ttl(TRANSCRIPT_TTL)
    }

    /// Bus that forgets a conversation's transcript after `ttl` without traffic.
    pub fn with_transcript_ttl(ttl: Duration) -> Arc<Self> {
        let (sink, inbox) = ChannelSink::channel();
        Arc::new(Self {
            agents: RwLock::new(HashMap::new()),
            sink: Arc::new(sink),
            inbox: Mutex::new(Some(inbox)),
            transcripts: Mutex::new(Transcripts {
                ttl,
                ..Transcripts::default()
            }),
            stop: Notify::new(),
        })
    }

    /// Subscribe the bus to `agent` and make it addressable by name.
    pub async fn register(&self, agent: Arc<dyn Agent>) {
        agent.core().subscribe(self.sink.clone()).await;
        let name = agent.name().to_string();
        if self.agents.write().await.insert(name.clone(), agent).is_some() {
            tracing::warn!("Replaced agent {} on the bus", name);
        } else {
            tracing::info!("Registered agent {} on the bus", name);
        }
    }

    pub async fn agent(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.read().await.get(name).cloned()
    }

    pub async fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Spawn [`MessageBus::run`] on the runtime.
    pub fn start(self: &Arc<Self>) -> JoinHandle<Result<()>> {
        let bus = self.clone();
        tokio::spawn(async move { bus.run().await })
    }

    /// Route events until [`MessageBus::shutdown`] is called.
    ///
    /// Each envelope is handled on its own task, so an agent waiting on a
    /// reply never blocks delivery of that reply.
    pub async fn run(&self) -> Result<()> {
        let mut inbox = self
            .inbox
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::other("Message bus already running"))?;

        tracing::info!("Message bus started");

        loop {
            tokio::select! {
                _ = self.stop.notified() => {
                    tracing::info!("Message bus stopping");
                    break;
                }
                event = inbox.recv() => match event {
                    Some(AgentEvent::Initialized { agent }) => {
                        tracing::info!("Agent {} is ready", agent);
                    }
                    Some(AgentEvent::Message(envelope)) => self.route(envelope).await,
                    None => break,
                },
            }
        }

        Ok(())
    }

    async fn route(&self, envelope: Envelope) {
        self.record(&envelope).await;

        let Some(agent) = self.agent(&envelope.to_agent).await else {
            tracing::warn!(
                "No agent {} for {} {} from {}, dropping",
                envelope.to_agent,
                envelope.message_type,
                envelope.id,
                envelope.from_agent
            );
            return;
        };

        tracing::debug!(
            "Routing {} {} from {} to {}",
            envelope.message_type,
            envelope.id,
            envelope.from_agent,
            envelope.to_agent
        );
        tokio::spawn(async move { agent.handle_a2a_message(envelope).await });
    }

    async fn record(&self, envelope: &Envelope) {
        let key = envelope
            .conversation_id
            .clone()
            .unwrap_or_else(|| DEFAULT_CONVERSATION.to_string());

        self.transcripts.lock().await.record(key, envelope.clone());
    }

    /// Envelopes routed for a conversation, oldest first.
    pub async fn transcript(&self, conversation_id: &str) -> Vec<Envelope> {
        let transcripts = self.transcripts.lock().await;
        transcripts
            .conversations
            .get(conversation_id)
            .filter(|t| t.touched_at.elapsed() < transcripts.ttl)
            .map(|t| t.envelopes.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Stop the routing loop.
    pub fn shutdown(&self) {
        self.stop.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorSettings;
    use crate::error::Result;
    use crate::memory::DEFAULT_CAPACITY;
    use crate::protocol::{into_payload, MessageType, Payload};
    use crate::specialists::flight::{FlightSpecialist, FLIGHT_SEARCH};
    use crate::specialists::hotel::{HotelSpecialist, HOTEL_SEARCH};
    use crate::specialists::TripCoordinator;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct TwoFlights;

    #[async_trait]
    impl Tool for TwoFlights {
        fn name(&self) -> &str {
            FLIGHT_SEARCH
        }

        fn description(&self) -> &str {
            "Always finds two flights"
        }

        async fn execute(&self, params: Payload) -> Result<Payload> {
            Ok(into_payload(json!({
                "status": "success",
                "flights": [{"price": "200"}, {"price": "150"}],
                "searchCriteria": params,
            })))
        }
    }

    struct OneHotel;

    #[async_trait]
    impl Tool for OneHotel {
        fn name(&self) -> &str {
            HOTEL_SEARCH
        }

        fn description(&self) -> &str {
            "Always finds one hotel"
        }

        async fn execute(&self, _params: Payload) -> Result<Payload> {
            Ok(into_payload(json!({"status": "success", "hotels": [{"price": "140"}]})))
        }
    }

    #[tokio::test]
    async fn test_coordinator_fans_out_to_both_specialists() {
        let bus = MessageBus::new();
        let coordinator = Arc::new(
            TripCoordinator::new(&CoordinatorSettings::default())
                .with_response_timeout(Duration::from_secs(5)),
        );
        bus.register(coordinator.clone()).await;
        bus.register(Arc::new(FlightSpecialist::with_search_tool(Arc::new(TwoFlights), DEFAULT_CAPACITY)))
            .await;
        bus.register(Arc::new(HotelSpecialist::with_search_tool(Arc::new(OneHotel), DEFAULT_CAPACITY)))
            .await;
        let handle = bus.start();

        let response = coordinator
            .process_request(into_payload(json!({
                "message": "Flight and hotel to Rome next week",
                "conversationId": "trip-2",
            })))
            .await
            .unwrap();

        assert_eq!(
            response["message"],
            json!("I found 2 flight options for your trip. Prices range from $150 to $200. I also found 1 hotel options in your destination.")
        );
        let transcript = bus.transcript("trip-2").await;
        assert_eq!(transcript.len(), 4);
        assert_eq!(
            transcript.iter().filter(|e| e.message_type == MessageType::Response).count(),
            2
        );

        bus.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_coordinator_and_specialist_round_trip() {
        crate::logging::init_test();
        let bus = MessageBus::new();
        let coordinator = Arc::new(
            TripCoordinator::new(&CoordinatorSettings::default())
                .with_response_timeout(Duration::from_secs(5)),
        );
        let flights = Arc::new(FlightSpecialist::with_search_tool(Arc::new(TwoFlights), DEFAULT_CAPACITY));
        bus.register(coordinator.clone()).await;
        bus.register(flights.clone()).await;
        let handle = bus.start();

        let response = coordinator
            .process_request(into_payload(json!({
                "message": "Book a flight to Paris tomorrow",
                "conversationId": "trip-1",
            })))
            .await
            .unwrap();

        assert_eq!(response["status"], json!("success"));
        assert_eq!(
            response["message"],
            json!("I found 2 flight options for your trip. Prices range from $150 to $200.")
        );

        let transcript = bus.transcript("trip-1").await;
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].message_type, MessageType::Request);
        assert_eq!(transcript[1].message_type, MessageType::Response);
        assert_eq!(transcript[1].correlation_id.as_deref(), Some(transcript[0].id.as_str()));

        bus.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_recipient_is_dropped() {
        let bus = MessageBus::new();
        let coordinator = Arc::new(
            TripCoordinator::new(&CoordinatorSettings::default())
                .with_flight_agent("nobody")
                .with_response_timeout(Duration::from_millis(100)),
        );
        bus.register(coordinator.clone()).await;
        let handle = bus.start();

        let response = coordinator
            .process_request(into_payload(json!({"message": "flight to Oslo", "conversationId": "c"})))
            .await
            .unwrap();

        assert_eq!(response["status"], json!("partial"));
        assert_eq!(bus.transcript("c").await.len(), 1);

        bus.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_twice_fails() {
        let bus = MessageBus::new();
        let handle = bus.start();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(bus.run().await.is_err());

        bus.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_transcript_is_bounded() {
        let bus = MessageBus::new();
        for i in 0..(MAX_TRANSCRIPT + 5) {
            let envelope = Envelope::new("a", "b", MessageType::Event, into_payload(json!({"i": i})));
            bus.record(&envelope).await;
        }

        let transcript = bus.transcript(DEFAULT_CONVERSATION).await;
        assert_eq!(transcript.len(), MAX_TRANSCRIPT);
        assert_eq!(transcript[0].payload["i"], json!(5));
        assert_eq!(bus.agent_names().await, Vec::<String>::new());
    }

    fn in_conversation(conversation: &str) -> Envelope {
        Envelope::compose("a", "b", MessageType::Event, Payload::new(), Some(conversation.to_string()))
    }

    #[tokio::test]
    async fn test_idle_transcripts_are_evicted() {
        let bus = MessageBus::with_transcript_ttl(Duration::from_millis(50));
        bus.record(&in_conversation("old")).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(bus.transcript("old").await.is_empty());

        bus.record(&in_conversation("new")).await;
        let transcripts = bus.transcripts.lock().await;
        assert!(!transcripts.conversations.contains_key("old"));
        assert!(transcripts.conversations.contains_key("new"));
    }

    #[tokio::test]
    async fn test_conversation_count_is_capped() {
        let bus = MessageBus::new();
        for i in 0..MAX_CONVERSATIONS {
            bus.record(&in_conversation(&format!("c{}", i))).await;
        }
        // Touching c0 leaves c1 as the least recently active.
        bus.record(&in_conversation("c0")).await;
        bus.record(&in_conversation("extra")).await;

        let transcripts = bus.transcripts.lock().await;
        assert_eq!(transcripts.conversations.len(), MAX_CONVERSATIONS);
        assert!(transcripts.conversations.contains_key("c0"));
        assert!(!transcripts.conversations.contains_key("c1"));
        assert!(transcripts.conversations.contains_key("c2"));
        assert!(transcripts.conversations.contains_key("extra"));
    }
}
