//! Appelle une action TR-064 sur le routeur configuré.
//!
//! ```text
//! cargo run -p pmotr064 --example tr064_action -- \
//!     urn:dslforum-org:service:WLANConfiguration:1 GetSSID NewSSID
//! ```
//!
//! Les arguments `Nom=Valeur` sont envoyés comme paramètres, les arguments
//! `Nom` seuls sont lus dans la réponse.

use pmotr064::{Parameter, Tr064Client, Tr064Config, init_logging};

fn main() -> anyhow::Result<()> {
    let config = Tr064Config::load("")?;
    init_logging(&config.logger.min_level);

    let mut args = std::env::args().skip(1);
    let service = args
        .next()
        .unwrap_or_else(|| "urn:dslforum-org:service:DeviceInfo:1".to_string());
    let action = args.next().unwrap_or_else(|| "GetInfo".to_string());

    let mut params = Vec::new();
    let mut bindings = Vec::new();
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => params.push(Parameter::new(name, value)),
            None => bindings.push(Parameter::binding(arg)),
        }
    }

    let client = Tr064Client::from_config(&config)?;
    client.init()?;
    tracing::info!("{} services available", client.services().len());

    let response = client.invoke(&service, &action, &params, &bindings)?;

    if bindings.is_empty() {
        println!("{}", response.raw);
    }
    for binding in &response.bindings {
        println!("{} = {}", binding.name, binding.value);
    }
    for issue in &response.issues {
        eprintln!("warning: {}", issue);
    }

    Ok(())
}
