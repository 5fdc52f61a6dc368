//! Small road networks shared by the unit tests.

use crate::network::NetworkDescription;

/// A toy network with two ways from `B` to `F`.
///
/// ```text
/// D -> A -> B =(lane 0)=> E -------> F
///      C -> B =(lane 1)=> G -> H --> F
/// ```
///
/// Every edge is 100 m long with a 10 m/s speed limit, so the free flow time is 10 s.
pub(crate) fn toy_network() -> NetworkDescription {
    NetworkDescription::new()
        .edge("D", 100.0, 10.0, 1)
        .edge("A", 100.0, 10.0, 1)
        .edge("C", 100.0, 10.0, 1)
        .edge("B", 100.0, 10.0, 2)
        .edge("E", 100.0, 10.0, 1)
        .edge("G", 100.0, 10.0, 1)
        .edge("H", 100.0, 10.0, 1)
        .edge("F", 100.0, 10.0, 1)
        .connect("D", 0, "A", 0)
        .connect("A", 0, "B", 0)
        .connect("A", 0, "B", 1)
        .connect("C", 0, "B", 1)
        .connect("B", 0, "E", 0)
        .connect("B", 1, "G", 0)
        .connect("E", 0, "F", 0)
        .connect("G", 0, "H", 0)
        .connect("H", 0, "F", 0)
}
