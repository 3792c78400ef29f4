//! `channels` and `paths` subcommands — apply an RX/TX selection to the board.

use super::{
    Config, FilterPath, Options, Result, load_config, open_registry, prepare_device, save_config,
};

pub(super) fn cmd_channels(
    rx: Option<usize>,
    tx: Option<usize>,
    save: bool,
    opts: &Options,
) -> Result<()> {
    let mut config = load_config(opts.config_path.as_deref());
    config.rx_channel = rx.unwrap_or(config.rx_channel);
    config.tx_channel = tx.unwrap_or(config.tx_channel);
    apply(&config, opts)?;
    println!(
        "RX channel {}, TX channel {} enabled",
        config.rx_channel, config.tx_channel
    );
    if save {
        let path = save_config(&config, opts)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

pub(super) fn cmd_paths(
    rx: Option<FilterPath>,
    tx: Option<FilterPath>,
    save: bool,
    opts: &Options,
) -> Result<()> {
    let mut config = load_config(opts.config_path.as_deref());
    if let Some(rx) = rx {
        config.rx_path = rx.to_string();
    }
    if let Some(tx) = tx {
        config.tx_path = tx.to_string();
    }
    apply(&config, opts)?;
    println!("RX path {}, TX path {}", config.rx_path, config.tx_path);
    if save {
        let path = save_config(&config, opts)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

/// Record the selection, then open the board so it is applied.
fn apply(config: &Config, opts: &Options) -> Result<()> {
    let registry = open_registry()?;
    let device = prepare_device(&registry, opts, config)?;
    device.open()
}
