/// Integration tests for the phase scheduler covering traversal order,
/// objections and ready-to-end, jumps, and multi-domain runs.
///
/// Every test runs on a paused tokio clock, so logical time only advances
/// when all tasks are idle.

mod domains;
mod helpers;
mod jumps;
mod objections;
