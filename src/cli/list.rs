use crate::{errors::Result, handlers::Registry, hook::Credential};

pub fn execute() -> Result<()> {
    let registry = Registry::builtin();
    let width = registry.iter().map(|handler| handler.name().len()).max().unwrap_or(0);

    for handler in registry.iter() {
        let needs = handler
            .required_credentials()
            .iter()
            .map(Credential::to_string)
            .collect::<Vec<_>>();
        if needs.is_empty() {
            println!("{:width$}  {}", handler.name(), handler.description());
        } else {
            println!(
                "{:width$}  {} (needs {})",
                handler.name(),
                handler.description(),
                needs.join(", ")
            );
        }
    }
    Ok(())
}
