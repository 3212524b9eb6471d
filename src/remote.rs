//! The remote execution boundary.
//!
//! A coordinator process may want to trigger a benchmark on another machine and collect its
//! textual result. This module only defines the pass-through seam for that: an [`Invoker`] is
//! a capability that executes a locally held client with a single opaque call and returns a
//! string result. No request/response framing is defined here; the transport that exposes an
//! [`Invoker`] to a remote caller is an external collaborator.

use crate::Error;

/// A capability that runs one benchmark execution and returns its textual result.
pub trait Invoker {
    fn execute(&mut self) -> Result<String, Error>;
}

/// Forwards [`Invoker::execute`] to a locally held client, unchanged. This is what a remoting
/// layer holds on the serving side.
pub struct Passthrough<C> {
    client: C,
}

impl<C: Invoker> Passthrough<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: Invoker> Invoker for Passthrough<C> {
    fn execute(&mut self) -> Result<String, Error> {
        self.client.execute()
    }
}

/// An [`Invoker`] that runs the benchmark described by a configuration string and returns its
/// report.
pub struct BenchInvoker {
    config: String,
}

impl BenchInvoker {
    pub fn new(config: String) -> Self {
        Self { config }
    }
}

impl Invoker for BenchInvoker {
    fn execute(&mut self) -> Result<String, Error> {
        crate::bench::run_from_str(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Invoker for Fixed {
        fn execute(&mut self) -> Result<String, Error> {
            Ok("done".to_string())
        }
    }

    #[test]
    fn passthrough_forwards() {
        let mut p = Passthrough::new(Fixed);
        assert_eq!(p.execute().unwrap(), "done");
    }

    #[test]
    fn bench_invoker_reports() {
        let config = r#"value_length = 10
                        insert_order = "ordered"
                        record_count = 100
                        operation_count = 100

                        [store]
                        name = "null""#;
        let mut p = Passthrough::new(BenchInvoker::new(config.to_string()));
        let report = p.execute().unwrap();
        assert!(report.contains("phase run"));
    }
}
