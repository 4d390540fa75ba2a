// Test modules for Haggle
// Each module covers the corresponding source module; support holds shared fixtures

mod support;

mod client_tests;
mod outbox_tests;
mod registry_tests;
mod storage_tests;
