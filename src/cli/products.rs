//! Product listing command

use clap::Args;

use super::{Cli, CliError, OutputFormat};
use crate::source::create_adapter;
use crate::Source;

/// Arguments for listing a source's products
#[derive(Args, Debug)]
pub struct ProductsArgs {
    /// Source identifier: CB or BN
    #[arg(long)]
    pub source: Source,

    /// Only show products containing this text (case-insensitive)
    #[arg(long)]
    pub filter: Option<String>,
}

impl ProductsArgs {
    /// Execute the products command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let adapter = create_adapter(self.source)?;
        let mut products = adapter.list_products().await?;

        if let Some(filter) = &self.filter {
            let needle = filter.to_uppercase();
            products.retain(|p| p.to_uppercase().contains(&needle));
        }
        products.sort();

        match cli.output_format {
            OutputFormat::Json => {
                let text = serde_json::to_string_pretty(&products)
                    .map_err(|e| CliError::OutputError(e.to_string()))?;
                println!("{text}");
            }
            OutputFormat::Human => {
                println!("Found {} products on {}:\n", products.len(), self.source);
                for product in products {
                    println!("{product}");
                }
            }
        }
        Ok(())
    }
}
