//! Cross-Context Broadcaster - best-effort change notices between contexts.
//!
//! ```text
//! ┌───────────┐  publish   ┌──────────────────┐   drain    ┌───────────┐
//! │ context A │──────────► │     Channel      │ ─────────► │ context B │
//! └───────────┘  bitcode   │ (shared log, one │  decode    └─────┬─────┘
//!                envelope  │ position / peer) │                  │ emit
//!                          └──────────────────┘                  ▼
//!                                                       EventEmitter handlers
//! ```
//!
//! Delivery is at-least-once and unordered at best, and may not happen at
//! all. A notice only tells the receiver to re-pull; reconciliation is what
//! makes contexts converge.

mod broadcaster;
mod channel;
mod notice;

pub use broadcaster::Broadcaster;
pub use channel::{
    Channel, ChannelError, Envelope, FaultMode, InMemoryChannel, RETAINED_ENVELOPES,
};
pub use notice::{GuideNotice, NoticeKind, GUIDE_UPDATES};
