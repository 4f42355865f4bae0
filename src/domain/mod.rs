//! Domain Layer
//!
//! # Architecture
//!
//! - **Ports** (`ports.rs`) - Trait abstractions for external collaborators
//! - **Events** (`events.rs`) - Notifications announced on the transport
//!
//! # Usage
//!
//! ```ignore
//! use pulsewatch::domain::ports::{HealthCheck, NotificationChannel};
//!
//! // Implement a port and hand it to the component that needs it
//! registry.register("database", DatabaseCheck::new(pool));
//! engine.add_channel(Arc::new(SlackChannel::new(webhook)));
//! ```

pub mod events;
pub mod ports;

pub use events::{Notification, NotificationCategory, NotificationSeverity};
pub use ports::{EventPublisher, HealthCheck, MetricSample, NotificationChannel, SystemSampler};
