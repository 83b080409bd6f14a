use certdash_http::{ApiClient, ApiError, ClientOptions, Notifier, RequestOptions};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Certificate {
    id: String,
    #[serde(default)]
    student_name: Option<String>,
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn error(&self, error: &ApiError) {
        eprintln!("error: {}", error.message);
    }

    fn success(&self, message: &str) {
        println!("{message}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = ClientOptions::from_env().map_err(anyhow::Error::msg)?;
    let token = std::env::var("CERTDASH_TOKEN").unwrap_or_default();

    let api = ApiClient::new(options)?
        .with_bearer_token(token)
        .with_notifier(ConsoleNotifier);

    let organization = std::env::args().nth(1).unwrap_or_else(|| "org-1".to_owned());
    let certificates = api
        .get::<Vec<Certificate>>(
            "/certificates",
            RequestOptions::new().with_query("organizationId", organization),
        )
        .await?;

    for certificate in certificates.data {
        println!(
            "{} {}",
            certificate.id,
            certificate.student_name.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
