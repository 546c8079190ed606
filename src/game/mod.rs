//! Session state: players, rooms, and the event processors for both channels

pub mod broadcast;
pub mod events;
pub mod player;
pub mod registry;
pub mod room;
pub mod transform;

pub use events::EventProcessor;
pub use player::PlayerId;
pub use registry::Registry;
pub use room::RoomCodePolicy;
pub use transform::TransformSync;
