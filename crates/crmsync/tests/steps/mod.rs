pub mod sync_steps;
