//! Notification bus used to synchronise runners with independently scheduled collaborators,
//! such as traffic generators, that do not share memory with the runner.

mod barrier;
mod bus;
mod local;
mod payload;
mod wait;

/// Topic traffic generators publish their lifecycle notifications on.
pub const TOPIC_TG: &str = "topic_traffic_generator";
/// Topic runners publish their lifecycle notifications on.
pub const TOPIC_RUNNER: &str = "topic_runner";

pub const TG_METHOD_STARTED: &str = "tg_method_started";
pub const TG_METHOD_FINISHED: &str = "tg_method_finished";
pub const TG_METHOD_ITERATION: &str = "tg_method_iteration";

pub const RUNNER_METHOD_START_ITERATION: &str = "runner_method_start_iteration";
pub const RUNNER_METHOD_STOP_ITERATION: &str = "runner_method_stop_iteration";

/// Version stamped into every payload this crate produces.
pub const PAYLOAD_VERSION: u32 = 1;

pub mod prelude {
    pub use crate::barrier::IterationBarrier;
    pub use crate::bus::{Endpoint, Message, MessageContext, NotificationBus, Subscription};
    pub use crate::local::LocalBus;
    pub use crate::payload::{Fields, GeneratorPayload, Payload, PayloadError, RunnerPayload};
    pub use crate::wait::{wait_until, WaitError};
    pub use crate::{
        PAYLOAD_VERSION, RUNNER_METHOD_START_ITERATION, RUNNER_METHOD_STOP_ITERATION,
        TG_METHOD_FINISHED, TG_METHOD_ITERATION, TG_METHOD_STARTED, TOPIC_RUNNER, TOPIC_TG,
    };
}
