mod snapshot_tests;
mod watcher_tests;
