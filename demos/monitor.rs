use std::env;
use std::sync::Arc;

use atmeex_cloud::{deci_to_celsius, AtmeexClient, Coordinator, DEFAULT_POLL_INTERVAL};

#[tokio::main]
async fn main() -> atmeex_cloud::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let email = args.get(1).expect("usage: monitor <email> <password>");
    let password = args.get(2).expect("usage: monitor <email> <password>");

    let client = Arc::new(AtmeexClient::builder(email, password).build());
    let coordinator = Arc::new(Coordinator::new(client));

    let mut rx = coordinator.subscribe();
    let poller = coordinator.clone();
    tokio::spawn(async move {
        poller.run(DEFAULT_POLL_INTERVAL).await;
    });

    println!("Polling every {DEFAULT_POLL_INTERVAL:?}...");
    loop {
        if rx.changed().await.is_err() {
            break;
        }
        let snapshot = rx.borrow_and_update().clone();
        for device in &snapshot.devices {
            let Some(state) = snapshot.state(device.id) else {
                continue;
            };
            println!(
                "[{}] {} | target {:.1}\u{00b0}C | fan {} | damper {} | hum stage {}{}{}",
                device.id,
                if state.power_on { "on" } else { "off" },
                deci_to_celsius(state.target_temperature_deci_c),
                state.fan_speed,
                state.damper_position,
                state.humidity_stage,
                state
                    .current_temperature_deci_c
                    .map(|t| format!(" | room {:.1}\u{00b0}C", deci_to_celsius(t)))
                    .unwrap_or_default(),
                if state.online { "" } else { " | OFFLINE" },
            );
        }
    }

    Ok(())
}
