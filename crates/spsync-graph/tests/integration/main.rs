//! Integration tests for spsync-graph
//!
//! Uses wiremock to simulate the Microsoft Graph API and the identity
//! platform token endpoint, and verifies end-to-end behavior of the
//! GraphClient retry policy, library resolution, listings, uploads, and
//! FileHash writes.

mod common;

mod test_tree;
