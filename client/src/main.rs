use common::ComputationRequest;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base = std::env::var("GATEWAY_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
    let client = reqwest::Client::new();

    let request = ComputationRequest {
        name: "Vladimir".to_string(),
        a: 5,
        b: 3,
    };

    for path in ["/compute/eval", "/compute/rpc"] {
        let resp = client
            .post(format!("{base}{path}"))
            .json(&request)
            .send()
            .await?;
        let status = resp.status();
        println!("{path}: {status} {:#?}", resp.text().await?);
    }
    Ok(())
}
