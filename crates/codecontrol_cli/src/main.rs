//! CLI smoke entry point.
//!
//! Builds a small mech graph, routes a few messages, saves the graph, loads
//! it into a fresh registry and prints a deterministic summary.
//!
//! Set `CODECONTROL_LOG_DIR` (absolute path) to capture core logs.

use codecontrol_core::{
    default_log_level, init_logging, Message, MessageBus, Model, ModelId, ModelIdError,
    ModelRef, ModelReferencer, ModelRefs, PersistError, Registry,
};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::process::ExitCode;
use std::rc::Rc;

#[derive(Default, Serialize, Deserialize)]
struct Pilot {
    callsign: String,
}

impl Model for Pilot {}

#[derive(Default, Serialize, Deserialize)]
struct Weapon {
    damage: u32,
}

impl Model for Weapon {}

#[derive(Default, Serialize, Deserialize)]
struct Mech {
    armor: Cell<u32>,
    pilot: ModelRef<Pilot>,
    weapons: ModelRefs<Weapon>,
}

impl Model for Mech {
    fn visit_references(&self, visit: &mut dyn FnMut(&dyn ModelReferencer)) {
        visit(&self.pilot);
        visit(&self.weapons);
    }
}

struct DamageMessage {
    amount: u32,
}

impl Message for DamageMessage {}

fn id(raw: &str) -> Result<ModelId, ModelIdError> {
    ModelId::parse(raw)
}

fn registry() -> Result<Registry, PersistError> {
    let registry = Registry::new();
    registry.register_type::<Pilot>("Pilot")?;
    registry.register_type::<Weapon>("Weapon")?;
    registry.register_type::<Mech>("Mech")?;
    Ok(registry)
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let source = registry()?;
    let pilot = source.create_with_id(
        id("pilot-1")?,
        Pilot {
            callsign: "Kestrel".to_string(),
        },
    )?;
    let cannon = source.create_with_id(id("weapon-1")?, Weapon { damage: 12 })?;
    let laser = source.create_with_id(id("weapon-2")?, Weapon { damage: 7 })?;
    let mech = source.create_with_id(id("mech-1")?, Mech::default())?;
    mech.armor.set(100);
    mech.pilot.set(Some(&pilot));
    mech.weapons.add(&cannon);
    mech.weapons.add(&laser);

    let bus = MessageBus::new();
    let target = mech.clone();
    let _hit = bus.subscribe_named("hit", move |message: &DamageMessage| {
        target.armor.set(target.armor.get().saturating_sub(message.amount));
        target.notify_change();
    });
    let changes = Rc::new(Cell::new(0));
    let counter = Rc::clone(&changes);
    let _watch = mech.subscribe_change(move |_| counter.set(counter.get() + 1));

    let volley: u32 = mech.weapons.to_vec().iter().map(|weapon| weapon.damage).sum();
    bus.send_named("hit", &DamageMessage { amount: volley });
    bus.send_named("crit", &DamageMessage { amount: 1000 });
    println!("armor_after_hit={} changes={}", mech.armor.get(), changes.get());

    let encoded = source.save(&mech.as_any())?.encode()?;
    log::info!("event=cli_save module=cli status=ok bytes={}", encoded.len());

    let restored = registry()?;
    let loaded = restored.load_encoded(&encoded).run_to_end()?;
    println!("loaded_models={}", loaded.len());

    let Some(copy) = restored.find_as::<Mech>(&id("mech-1")?) else {
        return Err("restored graph has no mech-1".into());
    };
    let callsign = copy
        .pilot
        .get()
        .map(|pilot| pilot.callsign.clone())
        .unwrap_or_default();
    println!(
        "restored armor={} pilot={} weapons={}",
        copy.armor.get(),
        callsign,
        copy.weapons.len()
    );

    copy.delete();
    println!("after_delete models={}", restored.len());
    Ok(())
}

fn main() -> ExitCode {
    if let Ok(log_dir) = std::env::var("CODECONTROL_LOG_DIR") {
        if let Err(err) = init_logging(default_log_level(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    println!("codecontrol_core version={}", codecontrol_core::core_version());
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
