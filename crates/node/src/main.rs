mod application;
mod components;
mod supervisor;


use std::io;

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = application::run().await {
        eprintln!("[ledgerwatch] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}
