pub mod dataframe;

pub use dataframe::DataFrame;
