use askdb_client::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    let sql = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "SELECT * FROM customers LIMIT 5".to_string());

    let client = Client::new(ClientConfig::from_env())?;
    let reply = client.run_sql(&sql).await?;

    let mut view = ResultsView::new();
    view.set_dataset(Some(reply.data));
    match view.current() {
        (Some(dataset), _) => {
            println!("{}", serde_json::to_string_pretty(dataset.rows()).expect("rows are JSON"));
            println!("{} row(s)", dataset.row_count());
        }
        (None, _) => println!("No data"),
    }
    Ok(())
}
