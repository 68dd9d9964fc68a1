//! Drives a test body across the ports of a peripheral family under one of three coverage
//! policies.
//!
//! Test bodies are plain closures taking the [`Port`] under test. They usually capture the
//! [`crate::tester::Tester`] by `&mut` and map the port's pins onto logical slots before
//! exercising the target's driver. A failing port is recorded and the run moves on.

use crate::ports::{
    find_ports,
    Port,
    PortDescriptor,
    Status,
};
use kstring::KString;
use shield_utils::board::Board;
use tracing::{
    error,
    info,
    warn,
};

/// How much of the matched port space a run covers
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Coverage {
    /// Every distinct matched port
    AllPorts,
    /// One port per peripheral instance
    AllPeripherals,
    /// A single port. `force_all_ports` turns this into [`Coverage::AllPorts`] for exhaustive
    /// runs.
    OnePeripheral { force_all_ports: bool },
}

/// What happened during one run
#[derive(Debug, Clone, Default)]
pub struct CoverageReport {
    pub family: KString,
    /// Complete ports with their final status
    pub matched: Vec<Port>,
    /// Ports that could not resolve every role. Never executed.
    pub unmatched: Vec<Port>,
    /// Number of test body invocations
    pub executed: usize,
    pub failures: usize,
    /// Human readable diagnostics, one per unmatched port or failed execution
    pub lines: Vec<String>,
}

impl CoverageReport {
    /// True when nothing failed. A run with no matched ports passes vacuously.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures == 0
    }
}

/// Runs test bodies against ports of one family on one board
#[derive(Debug)]
pub struct Orchestrator<'a, 'b> {
    board: &'a Board,
    desc: &'a PortDescriptor<'b>,
}

impl<'a, 'b> Orchestrator<'a, 'b> {
    #[must_use]
    pub fn new(board: &'a Board, desc: &'a PortDescriptor<'b>) -> Self {
        Self { board, desc }
    }

    /// Run `test` under `coverage`
    pub fn run<F>(&self, coverage: Coverage, test: F) -> CoverageReport
    where
        F: FnMut(&Port) -> anyhow::Result<()>,
    {
        match coverage {
            Coverage::AllPorts
            | Coverage::OnePeripheral {
                force_all_ports: true,
            } => self.all_ports(test),
            Coverage::AllPeripherals => self.all_peripherals(test),
            Coverage::OnePeripheral {
                force_all_ports: false,
            } => self.one_peripheral(test),
        }
    }

    fn prepare(&self) -> CoverageReport {
        let found = find_ports(self.board, self.desc);
        let mut report = CoverageReport {
            family: KString::from_ref(self.desc.name()),
            matched: found.matched,
            unmatched: found.unmatched,
            ..Default::default()
        };
        for port in &report.unmatched {
            let line = format!("unmatched {}", port.describe(self.board, self.desc));
            warn!("{line}");
            report.lines.push(line);
        }
        if report.matched.is_empty() {
            warn!("No {} port matched on {}", self.desc.name(), self.board.name());
        }
        report
    }

    fn execute<F>(&self, report: &mut CoverageReport, idx: usize, test: &mut F)
    where
        F: FnMut(&Port) -> anyhow::Result<()>,
    {
        let port = report.matched[idx];
        if port.status != Status::NotTested {
            return;
        }
        let name = port.describe(self.board, self.desc);
        info!("Testing {name}");
        report.executed += 1;
        let status = match test(&port) {
            Ok(()) => Status::Pass,
            Err(e) => {
                let line = format!("{name} failed: {e:#}");
                error!("{line}");
                report.lines.push(line);
                report.failures += 1;
                Status::Fail
            }
        };
        report.matched[idx].status = status;
    }

    /// Every distinct matched port once. Form factor pins are walked in order and each runs the
    /// ports that reference it and haven't run yet.
    pub fn all_ports<F>(&self, mut test: F) -> CoverageReport
    where
        F: FnMut(&Port) -> anyhow::Result<()>,
    {
        let mut report = self.prepare();
        for pin in self.board.form_factor().iter() {
            for idx in 0..report.matched.len() {
                if report.matched[idx].uses(pin) {
                    self.execute(&mut report, idx, &mut test);
                }
            }
        }
        report
    }

    /// One port per instance, the lowest in port order
    pub fn all_peripherals<F>(&self, mut test: F) -> CoverageReport
    where
        F: FnMut(&Port) -> anyhow::Result<()>,
    {
        let mut report = self.prepare();
        let mut order: Vec<usize> = (0..report.matched.len()).collect();
        order.sort_by(|&a, &b| report.matched[a].cmp(&report.matched[b]));
        let mut seen = vec![];
        for idx in order {
            let instance = report.matched[idx].instance();
            if seen.contains(&instance) {
                continue;
            }
            seen.push(instance);
            self.execute(&mut report, idx, &mut test);
        }
        report
    }

    /// The first matched port only
    pub fn one_peripheral<F>(&self, mut test: F) -> CoverageReport
    where
        F: FnMut(&Port) -> anyhow::Result<()>,
    {
        let mut report = self.prepare();
        if !report.matched.is_empty() {
            self.execute(&mut report, 0, &mut test);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Family;

    fn board() -> Board {
        Board::builder()
            .name("TEST")
            .form_factor(["D0", "D1", "D2", "D3", "D4", "D5"])
            .role("uart_tx", "D0", 1, 7)
            .role("uart_tx", "D2", 1, 7)
            .role("uart_tx", "D4", 3, 7)
            .role("uart_rx", "D1", 1, 7)
            .role("uart_rx", "D3", 1, 7)
            .role("uart_rx", "D5", 3, 7)
            .build()
            .unwrap()
    }

    #[test]
    fn test_all_ports_each_once() {
        let board = board();
        let desc = PortDescriptor::for_family(&board, Family::UartNoFc);
        let mut seen = vec![];
        let report = Orchestrator::new(&board, &desc).all_ports(|p| {
            seen.push(*p);
            Ok(())
        });
        assert_eq!(report.executed, seen.len());
        assert_eq!(report.executed, report.matched.len());
        for (i, a) in seen.iter().enumerate() {
            assert!(!seen[i + 1..].contains(a));
        }
        assert!(report.passed());
    }

    #[test]
    fn test_all_peripherals_one_per_instance() {
        let board = board();
        let desc = PortDescriptor::for_family(&board, Family::UartNoFc);
        let mut instances = vec![];
        let report = Orchestrator::new(&board, &desc).all_peripherals(|p| {
            instances.push(p.instance());
            Ok(())
        });
        assert_eq!(instances, vec![Some(1), Some(3)]);
        assert_eq!(report.executed, 2);
    }

    #[test]
    fn test_one_peripheral_once() {
        let board = board();
        let desc = PortDescriptor::for_family(&board, Family::UartNoFc);
        let mut calls = 0;
        let report = Orchestrator::new(&board, &desc).run(
            Coverage::OnePeripheral {
                force_all_ports: false,
            },
            |_| {
                calls += 1;
                Ok(())
            },
        );
        assert_eq!(calls, 1);
        assert_eq!(report.matched[0].status, Status::Pass);
    }

    #[test]
    fn test_failure_does_not_stop_run() {
        let board = board();
        let desc = PortDescriptor::for_family(&board, Family::UartNoFc);
        let mut calls = 0;
        let report = Orchestrator::new(&board, &desc).all_peripherals(|_| {
            calls += 1;
            anyhow::bail!("loopback mismatch")
        });
        assert_eq!(calls, 2);
        assert_eq!(report.failures, 2);
        assert!(!report.passed());
        assert!(report.lines.iter().all(|l| l.contains("loopback mismatch")));
    }

    #[test]
    fn test_no_ports_never_executes() {
        let board = board();
        let desc = PortDescriptor::for_family(&board, Family::I2c);
        let report = Orchestrator::new(&board, &desc).one_peripheral(|_| unreachable!());
        assert_eq!(report.executed, 0);
        assert!(report.passed());
    }
}
