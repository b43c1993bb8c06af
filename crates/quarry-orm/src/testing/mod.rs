//! Factories, fake values and seeders for populating databases in tests
//! and demos.

mod factory;
pub mod fake;
mod seeder;

pub use factory::Factory;
pub use seeder::{DatabaseSeeder, Seeder};
