// Storage Tests Module - Testing the storage module
// Tests organized by storage module functionality:
// - inquiry_tests: ids, prices, statuses and inquiry predicates
// - store_tests: SQLite store (atomic commit, version checks, ordering, read marks)
// - settings_tests: Settings defaults and persistence

mod inquiry_tests;
mod settings_tests;
mod store_tests;
