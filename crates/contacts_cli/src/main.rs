//! Contact book command-line front end.
//!
//! # Responsibility
//! - Parse commands, open the store and print results line by line.
//! - Keep output deterministic for scripting: one contact per line.

mod config;

use clap::Parser;
use config::{Cli, Command, Config};
use contacts_core::{Contact, ContactFormat, ContactStore, StoreConfig, ALL_GROUPS};
use log::error;
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(&cli);

    if let Some(log_dir) = config.log_dir.as_deref() {
        if let Err(err) = contacts_core::init_logging(&config.log_level, &log_dir.to_string_lossy())
        {
            eprintln!("warning: logging disabled: {err}");
        }
    }

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_command module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &Config) -> Result<(), Box<dyn Error>> {
    if command == Command::Ping {
        println!("contacts_core ping={}", contacts_core::ping());
        println!("contacts_core version={}", contacts_core::core_version());
        return Ok(());
    }

    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut store_config = StoreConfig::from_env();
    store_config.db_path = Some(config.db_path.clone());
    let store = ContactStore::open(&store_config)?;

    match command {
        Command::Ping => {}
        Command::List { query, group } => {
            let group = group.as_deref().filter(|g| *g != ALL_GROUPS);
            print_contacts(&store.browse(&query, group)?);
        }
        Command::Search { query } => print_contacts(&store.search(&query)?),
        Command::Favorites => print_contacts(&store.get_favorites()?),
        Command::Group { group } => print_contacts(&store.get_by_group(&group)?),
        Command::Recent { limit } => print_contacts(&store.get_recently_contacted(limit)?),
        Command::Dial { digits } => print_contacts(&store.dialer_suggestions(&digits)?),
        Command::Add {
            name,
            phone,
            group,
            favorite,
        } => {
            let contact = Contact::new(name, phone)
                .with_group(group)
                .with_favorite(favorite);
            let id = store.insert(&contact)?;
            println!("added id={id}");
        }
        Command::Favorite { id, value } => {
            require_contact(&store, id)?;
            store.toggle_favorite(id, value)?;
            println!("id={id} favorite={value}");
        }
        Command::Called { id } => {
            require_contact(&store, id)?;
            let at = store.mark_called_now(id)?;
            println!("id={id} last_called_at={at}");
        }
        Command::Delete { id } => {
            require_contact(&store, id)?;
            store.delete_by_id(id)?;
            println!("deleted id={id}");
        }
        Command::Import { file } => {
            let format = ContactFormat::from_path(&file)?;
            let reader = BufReader::new(File::open(&file)?);
            let ids = store.import(format, reader)?;
            println!("imported count={}", ids.len());
        }
        Command::Export { file } => {
            let format = ContactFormat::from_path(&file)?;
            let count = store.export(format, File::create(&file)?)?;
            println!("exported count={count}");
        }
    }
    Ok(())
}

fn require_contact(store: &ContactStore, id: i64) -> Result<(), Box<dyn Error>> {
    if store.get_by_id(id)?.is_none() {
        return Err(contacts_core::StoreError::NotFound(id).into());
    }
    Ok(())
}

fn print_contacts(contacts: &[Contact]) {
    for contact in contacts {
        println!("{}", format_contact(contact));
    }
}

fn format_contact(contact: &Contact) -> String {
    let mut line = format!("{}\t{}\t{}", contact.id, contact.name, contact.phone_number);
    if !contact.group.is_empty() {
        line.push_str(&format!("\t[{}]", contact.group));
    }
    if contact.is_favorite {
        line.push_str("\t*");
    }
    line
}
