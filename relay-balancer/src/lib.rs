//! Allocation-bounded peer choosers built on `relay-core`'s `Transport`/`Peer`
//! contracts: the fixed-arena ring chooser (C9) and the trivial direct chooser (C10).

mod arena;
pub mod chooser;
pub mod direct;
mod subscriber;

pub use chooser::{ChooserConfig, ChosenPeer, RingChooser, UpdateErrors};
pub use direct::{DirectChooser, DirectPeer};
pub use subscriber::SlotSubscriber;
