pub mod use_random;
