use std::time::Duration;

/// Zero-based index of the close price in a quote CSV row.
const CLOSE_PRICE_COLUMN: usize = 6;
/// Sentinel the quote source uses for tickers it cannot resolve.
const UNAVAILABLE: &str = "N/D";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

fn quote_url(stock_code: &str) -> String {
    format!("https://stooq.com/q/l/?s={stock_code}&f=sd2t2ohlcv&h&e=csv")
}

#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("quote endpoint returned status {0}")]
    Status(u16),
    #[error("malformed CSV: {0}")]
    MalformedCsv(#[from] csv::Error),
    #[error("incomplete CSV: no data row")]
    IncompleteCsv,
    #[error("unexpected CSV shape: {0} columns")]
    ShortRow(usize),
}

/// Resolves ticker codes against the quote data source.
pub struct QuoteClient {
    http: reqwest::Client,
}

impl Default for QuoteClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { http }
    }

    /// Fetch and format the quote sentence for one ticker.
    pub async fn fetch(&self, stock_code: &str) -> Result<String, QuoteError> {
        let response = self.http.get(quote_url(stock_code)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuoteError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let close_price = parse_close_price(&body)?;
        Ok(format_quote(stock_code, &close_price))
    }
}

/// Extract the close price from a CSV body: header row, then at least one
/// data row with the price at column 6.
pub fn parse_close_price(body: &str) -> Result<String, QuoteError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(body.as_bytes());

    let record = match reader.records().next() {
        Some(record) => record?,
        None => return Err(QuoteError::IncompleteCsv),
    };

    match record.get(CLOSE_PRICE_COLUMN) {
        Some(close_price) => Ok(close_price.to_string()),
        None => Err(QuoteError::ShortRow(record.len())),
    }
}

/// Render the broadcastable sentence for a close price.
pub fn format_quote(stock_code: &str, close_price: &str) -> String {
    let code = stock_code.to_uppercase();
    if close_price == UNAVAILABLE {
        format!("{code} quote is not available")
    } else {
        format!("{code} quote is ${close_price} per share")
    }
}
