//! Device nodes: gates, LPM devices, constant drivers, event probes,
//! and UDP instances.
//!
//! A [`Node`] is anything with behavior in the netlist. Each node kind
//! fixes a pin schema; for a plain gate, pin 0 is the output and pins
//! 1.. are the inputs. LPM devices expose named pin families through the
//! typed accessors below.

use crate::ids::{MemoryId, PinId};
use crate::link::PinDir;
use crate::udp::UdpTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use veris_common::{Ident, LogicVec};

/// The operation of a plain logic gate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum GateKind {
    And,
    Buf,
    Bufif0,
    Bufif1,
    Nand,
    Nor,
    Not,
    Or,
    Xnor,
    Xor,
}

/// The edge sensitivity of an event probe.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Any change of any input bit.
    AnyEdge,
    /// A 0-to-1 transition.
    Posedge,
    /// A 1-to-0 transition.
    Negedge,
    /// Any transition to a nonzero value.
    Positive,
}

/// The closed set of device kinds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum NodeKind {
    /// A logic gate: pin 0 output, pins 1..=ninputs inputs.
    Logic {
        /// The gate operation.
        gate: GateKind,
        /// The number of input pins.
        ninputs: u32,
    },
    /// A non-inverting buffer that isolates its input net: pin 0 output,
    /// pin 1 input.
    BufZ,
    /// Structural case equality: pin 0 output (always 0 or 1), pins 1
    /// and 2 inputs.
    CaseCmp,
    /// A constant driver with one output pin per bit.
    Const(LogicVec),
    /// An LPM add/subtract device of the given operand width.
    AddSub {
        /// Operand and result width.
        width: u32,
    },
    /// An LPM combinational shifter.
    CxShift {
        /// Data and result width.
        width: u32,
        /// Width of the shift-distance input.
        width_dist: u32,
    },
    /// An LPM magnitude comparator. Does not handle X/Z; use
    /// [`NodeKind::CaseCmp`] for case comparison.
    Compare {
        /// Operand width.
        width: u32,
    },
    /// A row of flip-flops with shared controls and per-bit data pins.
    Ff {
        /// Number of flip-flop bits.
        width: u32,
    },
    /// An LPM mux of `size` inputs, each `width` bits, with a
    /// `sel_width`-bit selector.
    Mux {
        /// Width of the result and of each data input.
        width: u32,
        /// Number of data inputs.
        size: u32,
        /// Width of the select input.
        sel_width: u32,
    },
    /// A memory port attached to a declared [`Memory`](crate::Memory).
    RamDq {
        /// The attached memory.
        memory: MemoryId,
        /// Address input width.
        awidth: u32,
        /// Data width; must equal the memory's element width.
        width: u32,
    },
    /// A structural input probe that triggers a procedural event.
    EventProbe {
        /// The sensitivity of the probe.
        edge: EdgeKind,
        /// Input width; only `AnyEdge` probes are normally wide.
        width: u32,
    },
    /// A user-defined primitive: pin 0 output, the rest inputs.
    Udp(Box<UdpTable>),
}

impl NodeKind {
    /// The fixed pin count of this node kind.
    pub fn pin_count(&self) -> u32 {
        match self {
            NodeKind::Logic { ninputs, .. } => 1 + ninputs,
            NodeKind::BufZ => 2,
            NodeKind::CaseCmp => 3,
            NodeKind::Const(v) => v.width(),
            NodeKind::AddSub { width } => 6 + 3 * width,
            NodeKind::CxShift { width, width_dist } => 3 + 2 * width + width_dist,
            NodeKind::Compare { width } => 8 + 2 * width,
            NodeKind::Ff { width } => 8 + 2 * width,
            NodeKind::Mux {
                width,
                size,
                sel_width,
            } => 2 + width + sel_width + width * size,
            NodeKind::RamDq { awidth, width, .. } => 3 + awidth + 2 * width,
            NodeKind::EventProbe { width, .. } => *width,
            NodeKind::Udp(table) => 1 + table.ninputs(),
        }
    }

    /// The direction of the pin at `idx` in this kind's schema.
    pub fn pin_dir(&self, idx: u32) -> PinDir {
        match self {
            NodeKind::Logic { .. } | NodeKind::BufZ | NodeKind::CaseCmp | NodeKind::Udp(_) => {
                if idx == 0 {
                    PinDir::Output
                } else {
                    PinDir::Input
                }
            }
            NodeKind::Const(_) => PinDir::Output,
            NodeKind::AddSub { width } => {
                // Aclr, Add_Sub, Clock, Cin | Cout, Overflow | DataA, DataB | Result
                if idx < 4 {
                    PinDir::Input
                } else if idx < 6 {
                    PinDir::Output
                } else if idx < 6 + 2 * width {
                    PinDir::Input
                } else {
                    PinDir::Output
                }
            }
            NodeKind::CxShift { width, .. } => {
                // Direction | Underflow, Overflow | Data | Result | Distance
                if idx == 0 {
                    PinDir::Input
                } else if idx < 3 {
                    PinDir::Output
                } else if idx < 3 + width {
                    PinDir::Input
                } else if idx < 3 + 2 * width {
                    PinDir::Output
                } else {
                    PinDir::Input
                }
            }
            NodeKind::Compare { .. } => {
                // Aclr, Clock | AGB..ALEB | DataA, DataB
                if idx < 2 {
                    PinDir::Input
                } else if idx < 8 {
                    PinDir::Output
                } else {
                    PinDir::Input
                }
            }
            NodeKind::Ff { width } => {
                // Clock..Sclr | Data | Q
                if idx < 8 + width {
                    PinDir::Input
                } else {
                    PinDir::Output
                }
            }
            NodeKind::Mux { width, .. } => {
                // Aclr, Clock | Result | Sel | Data
                if idx < 2 {
                    PinDir::Input
                } else if idx < 2 + width {
                    PinDir::Output
                } else {
                    PinDir::Input
                }
            }
            NodeKind::RamDq { awidth, width, .. } => {
                // InClock, OutClock, WE | Address | Data | Q
                if idx < 3 + awidth + width {
                    PinDir::Input
                } else {
                    PinDir::Output
                }
            }
            NodeKind::EventProbe { .. } => PinDir::Input,
        }
    }

    /// A short kind tag used by dumps.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Logic { .. } => "logic",
            NodeKind::BufZ => "bufz",
            NodeKind::CaseCmp => "casecmp",
            NodeKind::Const(_) => "const",
            NodeKind::AddSub { .. } => "addsub",
            NodeKind::CxShift { .. } => "cxshift",
            NodeKind::Compare { .. } => "compare",
            NodeKind::Ff { .. } => "ff",
            NodeKind::Mux { .. } => "mux",
            NodeKind::RamDq { .. } => "ramdq",
            NodeKind::EventProbe { .. } => "event",
            NodeKind::Udp(_) => "udp",
        }
    }
}

/// A device node in the netlist.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    /// The node name.
    pub name: Ident,
    /// What this node is.
    pub kind: NodeKind,
    /// The pins, in schema order. Fixed at construction.
    pub pins: Vec<PinId>,
    /// Rise/fall/decay delay times.
    pub delays: [u64; 3],
    /// Free-form attributes.
    pub attributes: BTreeMap<String, String>,
    /// Mark bit used by traversals.
    pub mark: bool,
}

impl Node {
    /// Creates a node record. The pins are allocated by the design.
    pub fn new(name: Ident, kind: NodeKind) -> Self {
        Self {
            name,
            kind,
            pins: Vec::new(),
            delays: [0; 3],
            attributes: BTreeMap::new(),
            mark: false,
        }
    }

    /// The fixed pin count.
    pub fn pin_count(&self) -> u32 {
        self.kind.pin_count()
    }

    /// The pin at schema index `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range for the node kind.
    pub fn pin(&self, idx: u32) -> PinId {
        self.pins[idx as usize]
    }

    /// Looks up an attribute value.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }

    /// Returns true if this node has all the attributes of `other`, with
    /// the same values.
    pub fn has_compat_attributes(&self, other: &Node) -> bool {
        other
            .attributes
            .iter()
            .all(|(k, v)| self.attributes.get(k) == Some(v))
    }

    fn kind_mismatch(&self, wanted: &str) -> ! {
        panic!("pin {wanted} is not defined for {} nodes", self.kind.tag())
    }

    /// Output pin of a gate-shaped node (Logic, BufZ, CaseCmp, UDP).
    pub fn pin_output(&self) -> PinId {
        match self.kind {
            NodeKind::Logic { .. } | NodeKind::BufZ | NodeKind::CaseCmp | NodeKind::Udp(_) => {
                self.pin(0)
            }
            _ => self.kind_mismatch("output"),
        }
    }

    /// Input pin `i` of a gate-shaped node.
    pub fn pin_input(&self, i: u32) -> PinId {
        match self.kind {
            NodeKind::Logic { .. } | NodeKind::BufZ | NodeKind::CaseCmp | NodeKind::Udp(_) => {
                self.pin(1 + i)
            }
            _ => self.kind_mismatch("input"),
        }
    }

    /// Asynchronous-clear control pin.
    pub fn pin_aclr(&self) -> PinId {
        match self.kind {
            NodeKind::AddSub { .. } => self.pin(0),
            NodeKind::Compare { .. } => self.pin(0),
            NodeKind::Ff { .. } => self.pin(4),
            NodeKind::Mux { .. } => self.pin(0),
            _ => self.kind_mismatch("Aclr"),
        }
    }

    /// Clock pin of a clocked LPM device.
    pub fn pin_clock(&self) -> PinId {
        match self.kind {
            NodeKind::AddSub { .. } => self.pin(2),
            NodeKind::Compare { .. } => self.pin(1),
            NodeKind::Ff { .. } => self.pin(0),
            NodeKind::Mux { .. } => self.pin(1),
            _ => self.kind_mismatch("Clock"),
        }
    }

    /// Add/subtract mode select of an `AddSub`.
    pub fn pin_add_sub(&self) -> PinId {
        match self.kind {
            NodeKind::AddSub { .. } => self.pin(1),
            _ => self.kind_mismatch("Add_Sub"),
        }
    }

    /// Carry-in of an `AddSub`.
    pub fn pin_cin(&self) -> PinId {
        match self.kind {
            NodeKind::AddSub { .. } => self.pin(3),
            _ => self.kind_mismatch("Cin"),
        }
    }

    /// Carry-out of an `AddSub`.
    pub fn pin_cout(&self) -> PinId {
        match self.kind {
            NodeKind::AddSub { .. } => self.pin(4),
            _ => self.kind_mismatch("Cout"),
        }
    }

    /// Overflow output of an `AddSub` or `CxShift`.
    pub fn pin_overflow(&self) -> PinId {
        match self.kind {
            NodeKind::AddSub { .. } => self.pin(5),
            NodeKind::CxShift { .. } => self.pin(2),
            _ => self.kind_mismatch("Overflow"),
        }
    }

    /// Underflow output of a `CxShift`.
    pub fn pin_underflow(&self) -> PinId {
        match self.kind {
            NodeKind::CxShift { .. } => self.pin(1),
            _ => self.kind_mismatch("Underflow"),
        }
    }

    /// Direction select of a `CxShift`.
    pub fn pin_direction(&self) -> PinId {
        match self.kind {
            NodeKind::CxShift { .. } => self.pin(0),
            _ => self.kind_mismatch("Direction"),
        }
    }

    /// Bit `i` of the `DataA` family.
    pub fn pin_data_a(&self, i: u32) -> PinId {
        match self.kind {
            NodeKind::AddSub { .. } => self.pin(6 + i),
            NodeKind::Compare { .. } => self.pin(8 + i),
            _ => self.kind_mismatch("DataA"),
        }
    }

    /// Bit `i` of the `DataB` family.
    pub fn pin_data_b(&self, i: u32) -> PinId {
        match self.kind {
            NodeKind::AddSub { width } => self.pin(6 + width + i),
            NodeKind::Compare { width } => self.pin(8 + width + i),
            _ => self.kind_mismatch("DataB"),
        }
    }

    /// Bit `i` of the `Result` family.
    pub fn pin_result(&self, i: u32) -> PinId {
        match self.kind {
            NodeKind::AddSub { width } => self.pin(6 + 2 * width + i),
            NodeKind::CxShift { width, .. } => self.pin(3 + width + i),
            NodeKind::Mux { .. } => self.pin(2 + i),
            _ => self.kind_mismatch("Result"),
        }
    }

    /// Bit `i` of the `Data` family.
    pub fn pin_data(&self, i: u32) -> PinId {
        match self.kind {
            NodeKind::CxShift { .. } => self.pin(3 + i),
            NodeKind::Ff { .. } => self.pin(8 + i),
            NodeKind::RamDq { awidth, .. } => self.pin(3 + awidth + i),
            _ => self.kind_mismatch("Data"),
        }
    }

    /// Bit `i` of the shift `Distance` input.
    pub fn pin_distance(&self, i: u32) -> PinId {
        match self.kind {
            NodeKind::CxShift { width, .. } => self.pin(3 + 2 * width + i),
            _ => self.kind_mismatch("Distance"),
        }
    }

    /// Bit `i` of the `Q` output family.
    pub fn pin_q(&self, i: u32) -> PinId {
        match self.kind {
            NodeKind::Ff { width } => self.pin(8 + width + i),
            NodeKind::RamDq { awidth, width, .. } => self.pin(3 + awidth + width + i),
            _ => self.kind_mismatch("Q"),
        }
    }

    /// Enable pin of an `Ff`.
    pub fn pin_enable(&self) -> PinId {
        match self.kind {
            NodeKind::Ff { .. } => self.pin(1),
            _ => self.kind_mismatch("Enable"),
        }
    }

    /// Asynchronous-load pin of an `Ff`.
    pub fn pin_aload(&self) -> PinId {
        match self.kind {
            NodeKind::Ff { .. } => self.pin(2),
            _ => self.kind_mismatch("Aload"),
        }
    }

    /// Asynchronous-set pin of an `Ff`.
    pub fn pin_aset(&self) -> PinId {
        match self.kind {
            NodeKind::Ff { .. } => self.pin(3),
            _ => self.kind_mismatch("Aset"),
        }
    }

    /// Synchronous-load pin of an `Ff`.
    pub fn pin_sload(&self) -> PinId {
        match self.kind {
            NodeKind::Ff { .. } => self.pin(5),
            _ => self.kind_mismatch("Sload"),
        }
    }

    /// Synchronous-set pin of an `Ff`.
    pub fn pin_sset(&self) -> PinId {
        match self.kind {
            NodeKind::Ff { .. } => self.pin(6),
            _ => self.kind_mismatch("Sset"),
        }
    }

    /// Synchronous-clear pin of an `Ff`.
    pub fn pin_sclr(&self) -> PinId {
        match self.kind {
            NodeKind::Ff { .. } => self.pin(7),
            _ => self.kind_mismatch("Sclr"),
        }
    }

    /// Bit `i` of a `Mux` select input.
    pub fn pin_sel(&self, i: u32) -> PinId {
        match self.kind {
            NodeKind::Mux { width, .. } => self.pin(2 + width + i),
            _ => self.kind_mismatch("Sel"),
        }
    }

    /// Wire bit `wi` of data input `si` of a `Mux`.
    pub fn pin_mux_data(&self, wi: u32, si: u32) -> PinId {
        match self.kind {
            NodeKind::Mux {
                width, sel_width, ..
            } => self.pin(2 + width + sel_width + si * width + wi),
            _ => self.kind_mismatch("Data"),
        }
    }

    /// `A > B` output of a `Compare`.
    pub fn pin_agb(&self) -> PinId {
        self.compare_out(2)
    }

    /// `A >= B` output of a `Compare`.
    pub fn pin_ageb(&self) -> PinId {
        self.compare_out(3)
    }

    /// `A == B` output of a `Compare`.
    pub fn pin_aeb(&self) -> PinId {
        self.compare_out(4)
    }

    /// `A != B` output of a `Compare`.
    pub fn pin_aneb(&self) -> PinId {
        self.compare_out(5)
    }

    /// `A < B` output of a `Compare`.
    pub fn pin_alb(&self) -> PinId {
        self.compare_out(6)
    }

    /// `A <= B` output of a `Compare`.
    pub fn pin_aleb(&self) -> PinId {
        self.compare_out(7)
    }

    fn compare_out(&self, idx: u32) -> PinId {
        match self.kind {
            NodeKind::Compare { .. } => self.pin(idx),
            _ => self.kind_mismatch("compare output"),
        }
    }

    /// Write-enable pin of a `RamDq`.
    pub fn pin_we(&self) -> PinId {
        match self.kind {
            NodeKind::RamDq { .. } => self.pin(2),
            _ => self.kind_mismatch("WE"),
        }
    }

    /// Input-clock pin of a `RamDq`.
    pub fn pin_inclock(&self) -> PinId {
        match self.kind {
            NodeKind::RamDq { .. } => self.pin(0),
            _ => self.kind_mismatch("InClock"),
        }
    }

    /// Output-clock pin of a `RamDq`.
    pub fn pin_outclock(&self) -> PinId {
        match self.kind {
            NodeKind::RamDq { .. } => self.pin(1),
            _ => self.kind_mismatch("OutClock"),
        }
    }

    /// Bit `i` of a `RamDq` address input.
    pub fn pin_address(&self, i: u32) -> PinId {
        match self.kind {
            NodeKind::RamDq { .. } => self.pin(3 + i),
            _ => self.kind_mismatch("Address"),
        }
    }
}
