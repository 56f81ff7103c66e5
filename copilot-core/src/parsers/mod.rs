pub mod mo;
