// Event delivery implementations.

pub mod subscriber_hub;

pub use subscriber_hub::SubscriberHub;
