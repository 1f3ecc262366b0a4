pub mod helpers;

mod tests_api;
