//! Sync tests against the loopback channel and the in-memory identity
//! provider.

mod harness;
