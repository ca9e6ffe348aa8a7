mod sink;

pub use sink::{ResultSender, ResultSink};
