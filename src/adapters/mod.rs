//! Infrastructure Adapters
//!
//! Implementations of the domain ports, following the Port/Adapter
//! (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │  EventPublisher │ SystemSampler │ NotificationChannel      │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ LoggingEventPublisher │ InMemoryEventCollector │ Notifier  │ │
//! │  │ SysinfoSampler │ LoggingChannel │ WebhookChannel          │ │
//! │  │ PrometheusExporter                                         │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use pulsewatch::adapters::{LoggingEventPublisher, Notifier, DEFAULT_NOTIFIER_CAPACITY};
//!
//! let (notifier, _forwarder) = Notifier::spawn(
//!     Arc::new(LoggingEventPublisher::new()),
//!     DEFAULT_NOTIFIER_CAPACITY,
//! );
//! let store = MetricStore::new(1000, notifier.clone());
//! ```

mod channels;
mod event_publisher;
mod notifier;
mod prometheus_exporter;
mod sysinfo_sampler;

pub use channels::{LoggingChannel, WebhookChannel};
pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use notifier::{Notifier, DEFAULT_NOTIFIER_CAPACITY};
pub use prometheus_exporter::PrometheusExporter;
pub use sysinfo_sampler::SysinfoSampler;
