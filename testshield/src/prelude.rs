//! Prelude (helpful reexports) for this package

pub use crate::{
    core::{
        LogicalPin,
        Peripheral,
        PullMode,
    },
    orchestrator::{
        Coverage,
        CoverageReport,
        Orchestrator,
    },
    ports::{
        find_ports,
        Family,
        Port,
        PortDescriptor,
    },
    sim::Shield,
    tester::{
        ControlMode,
        Tester,
    },
    transport::Transport,
};
pub use ctlwire::PinBus;
pub use fixed::prelude::*;
pub use shield_utils::{
    board::{
        read_board_file,
        Board,
    },
    pins::PhysicalPin,
};
