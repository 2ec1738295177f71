/// Example that follows the default service and technology states as they
/// change.
use barman::{Barman, DirectoryEvent};

#[tokio::main]
async fn main() -> barman::Result<()> {
    let barman = Barman::new().await?;
    // Subscribe before waiting so nothing is missed
    let mut events = barman.subscribe();

    while let Ok(event) = events.recv().await {
        match event {
            DirectoryEvent::ConnectedChanged(true) => println!("barman is up"),
            DirectoryEvent::ConnectedChanged(false) => println!("barman went away"),
            DirectoryEvent::DefaultServiceChanged(Some(path)) => {
                let name = barman
                    .service(&path)
                    .map(|s| s.name().to_owned())
                    .unwrap_or_default();
                println!("Default service: {name} ({path})");
            }
            DirectoryEvent::DefaultServiceChanged(None) => println!("No default service"),
            DirectoryEvent::TechnologyStateChanged { kind, state } => {
                println!("{kind} is now {state}");
            }
            _ => {}
        }
    }

    Ok(())
}
