//! One render pass of the stock forecast dashboard and its HTML rendering.

mod html;
mod page;
mod pipeline;

pub use html::{escape, render_html};
pub use page::{Block, Page};
pub use pipeline::{
    fit_forecast, Dashboard, APP_TITLE, EMPTY_TICKER_WARNING, ERROR_PREFIX, LOADING,
    LOADING_DONE, NO_CURRENT_PRICE_WARNING, TICKER_LABEL, YEARS_LABEL,
};
