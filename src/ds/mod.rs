pub(crate) mod entry;
pub(crate) mod slots;

pub(crate) use entry::{EntryNode, INITIAL_FREQ, MAX_FREQUENCY};
pub(crate) use slots::SlotArray;
