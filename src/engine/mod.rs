pub mod poller;

pub use poller::PresencePoller;
