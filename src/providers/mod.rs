pub mod coinmarketcap;
pub mod exchangerate;
pub mod util;

pub use coinmarketcap::CoinMarketCapProvider;
pub use exchangerate::ExchangeRateProvider;
