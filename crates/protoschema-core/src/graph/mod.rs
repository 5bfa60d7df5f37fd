pub mod cycles;

pub use cycles::find_cycles;
