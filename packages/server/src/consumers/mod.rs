pub mod dead_letter;

pub use dead_letter::consume_dead_letters;
