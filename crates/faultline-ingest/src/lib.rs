//! Metric ingest adapters: the binary component-bus receiver and the
//! orchestrator REST poller. Both feed the shared [`Dispatcher`], which
//! stores snapshots, runs the evaluator, and forwards alert events onto
//! the transport.

pub mod bus;
pub mod dispatcher;
pub mod poller;


pub use bus::{decode_packet, BusError, BusReceiver};
pub use dispatcher::Dispatcher;
pub use poller::{OrchestratorClient, PollError, Poller};
