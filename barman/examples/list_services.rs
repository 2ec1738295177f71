use barman::Barman;

#[tokio::main]
async fn main() -> barman::Result<()> {
    let barman = Barman::new().await?;

    println!("Waiting for barman...");
    barman.wait_until_connected().await?;

    let default = barman.default_service().map(|s| s.path().to_owned());
    for service in barman.services() {
        let marker = if default.as_deref() == Some(service.path()) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {:30} {:10} {:12} {}%",
            service.name(),
            service.service_type(),
            service.state(),
            service.strength()
        );
    }

    Ok(())
}
