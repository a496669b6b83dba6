mod auction;
mod bid;

pub use {
    auction::*,
    bid::*,
};
