use askdb_client::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    let question = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "How many customers are there?".to_string());

    let session = ChatSession::new(ClientConfig::from_env())?;
    let mut stream = session.submit(question)?;

    while let Some(event) = stream.next_event().await {
        match event {
            StreamEvent::Token { text } => print!("{text}"),
            StreamEvent::Sql { text } => eprintln!("\n[sql] {text}"),
            StreamEvent::Error { text } => eprintln!("\n[error] {text}"),
            StreamEvent::Start | StreamEvent::Data { .. } | StreamEvent::End => {}
        }
    }

    let message = stream.finish().await;
    if let Some(rows) = &message.rows {
        println!("\n{} row(s) returned", rows.len());
    }
    Ok(())
}
