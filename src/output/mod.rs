pub mod color;
pub mod dump;
pub mod printer;

pub use color::Palette;
pub use printer::Printer;
