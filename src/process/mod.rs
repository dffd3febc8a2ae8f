//! Process-lifecycle helpers: the single `fork` mandated by a requested
//! PID namespace, and exit-status propagation.

pub mod spawner;
