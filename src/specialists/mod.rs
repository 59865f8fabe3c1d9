//! Specialist agents built on the base agent.

pub mod coordinator;
pub mod flight;
pub mod hotel;

pub use coordinator::{TripCoordinator, TripPlan, TripPlanningTool, TripType};
pub use flight::{
    FlightAction, FlightSearch, FlightSearchParams, FlightSearchTool, FlightSpecialist, PriceAnalysisTool,
};
pub use hotel::{HotelAction, HotelSearch, HotelSearchTool, HotelSpecialist};
