use retry_header_delay::{RetryClient, RetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::var("RETRY_DEMO_URL")?;

    let client = RetryClient::from_env().map_err(anyhow::Error::msg)?;

    let delivery = client
        .get(&url)
        .retry(
            RetryConfig::new(5)
                .retry_on([429])
                .wait_header("Retry-After"),
        )
        .send()
        .await;

    println!("retries: {}", delivery.retries());
    let response = delivery.into_result()?;
    println!("{} {}", response.status(), response.text());

    Ok(())
}
