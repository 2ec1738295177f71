/// Example toggling offline mode with a custom action timeout.
use barman::{Barman, BarmanConfig, TechnologyType};
use std::time::Duration;

#[tokio::main]
async fn main() -> barman::Result<()> {
    let config = BarmanConfig::new()
        .with_action_timeout(Duration::from_secs(30))
        .with_property_timeout(Duration::from_secs(5));

    let barman = Barman::with_config(config).await?;
    barman.wait_until_connected().await?;

    let offline = !barman.offline_mode();
    barman.set_offline_mode(offline).await?;
    println!("Offline mode: {offline}");

    if !offline {
        barman.enable_technology(TechnologyType::Wifi).await?;
        println!("Wi-Fi: {}", barman.technology_state(TechnologyType::Wifi));
    }

    Ok(())
}
