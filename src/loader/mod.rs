// Price loaders: the trait the facade consumes and the Yahoo Finance implementation.

pub mod traits;
pub mod yahoo;

pub use traits::PriceLoader;
pub use yahoo::YahooLoader;
