// Copyright 2022 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.

// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

//! Sign and verify C2PA manifests in JPEG files.

use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use log::warn;

use c2pa_store::{
    assertions::{
        actions::c2pa_action, ingredient::PARENT_OF, new_cbor_assertion, new_json_assertion,
        Action, Actions, DataHash, Ingredient,
    },
    claim::Claim,
    read_jpeg, signature,
    status::all_ok,
    store::{self, Store},
    write_jpeg, Hasher, OpensslSigner, ValidationStatus, XmpPolicy,
};

#[derive(Parser)]
#[command(
    name = "c2pa-store",
    version,
    about = "Sign and verify C2PA provenance manifests in JPEG files"
)]
struct Cli {
    /// Switch to signing mode
    #[arg(long)]
    sign: bool,

    /// Switch to verify mode (the default)
    #[arg(long)]
    verify: bool,

    /// If signing, the keystore to load credentials from (PKCS#12)
    #[arg(long)]
    keystore: Option<PathBuf>,

    /// If signing, the password to open the keystore
    #[arg(long, default_value = "")]
    password: String,

    /// If signing, the alias from the keystore (default is the first one)
    #[arg(long)]
    alias: Option<String>,

    /// If signing, the hash algorithm (sha256, sha384 or sha512)
    #[arg(long)]
    alg: Option<String>,

    /// If signing, a file containing a JSON schema to embed as a
    /// stds.schema-org.CreativeWork assertion
    #[arg(long)]
    creativework: Option<PathBuf>,

    /// If signing, the filename to write signed output to (default derives
    /// from the input)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Filename to dump the raw C2PA store to
    #[arg(long = "c2pa")]
    c2pa_out: Option<PathBuf>,

    /// When re-signing a file that already has a manifest, wrap the prior
    /// manifest as a parentOf ingredient with a c2pa.repackaged action
    #[arg(long)]
    repackage: bool,

    /// Dump the store as JSON
    #[arg(long)]
    debug: bool,

    /// Dump the store as a box tree
    #[arg(long)]
    boxdebug: bool,

    /// The files to sign or verify
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    for file in &cli.files {
        if cli.sign && !cli.verify {
            sign_file(cli, file)?;
        } else {
            verify_file(cli, file)?;
        }
    }
    Ok(())
}

fn print_statuses(statuses: &[ValidationStatus]) {
    for status in statuses {
        println!("# {status}");
    }
}

fn dump_store(cli: &Cli, store: &Store) -> anyhow::Result<()> {
    if cli.debug {
        println!("{}", serde_json::to_string_pretty(&store.to_json()?)?);
    }
    if cli.boxdebug {
        println!("{:#?}", store.root());
    }
    Ok(())
}

/// Load a signer identity from a keystore file, sniffing the format by
/// magic: 0xfeedfeed is JKS, 0xcececece is JCEKS, anything else PKCS#12.
fn load_signer(cli: &Cli) -> anyhow::Result<OpensslSigner> {
    let path = cli
        .keystore
        .as_ref()
        .ok_or_else(|| anyhow!("no keystore"))?;
    let mut data = Vec::new();
    File::open(path)
        .with_context(|| format!("opening keystore {}", path.display()))?
        .read_to_end(&mut data)?;

    if data.len() >= 4 {
        let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        match magic {
            0xfeed_feed => bail!("JKS keystores are not supported; convert to PKCS#12"),
            0xcece_cece => bail!("JCEKS keystores are not supported; convert to PKCS#12"),
            _ => {}
        }
    }
    if cli.alias.is_some() {
        warn!("--alias is ignored for PKCS#12 keystores");
    }

    Ok(OpensslSigner::from_pkcs12(&data, &cli.password)?)
}

fn derived_out_name(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_owned());
    let ext = input
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "jpg".to_owned());
    input.with_file_name(format!("{stem}-signed.{ext}"))
}

fn sign_file(cli: &Cli, input: &Path) -> anyhow::Result<()> {
    if let Some(alg) = &cli.alg {
        Hasher::new(alg).map_err(|_| anyhow!("hash algorithm {alg:?} is not supported"))?;
    }

    let signer = load_signer(cli)?;
    let image = read_jpeg(&mut File::open(input)?)
        .with_context(|| format!("reading {}", input.display()))?;

    // Prepare store
    let mut store = Store::new();
    let manifest_label = format!("urn:uuid:{}", uuid::Uuid::new_v4());
    let mut manifest = store::new_manifest(&manifest_label)?;

    let claim = Claim {
        format: Some("image/jpeg".to_owned()),
        instance_id: Some(format!("urn:uuid:{}", uuid::Uuid::new_v4())),
        alg: cli.alg.clone(),
        ..Default::default()
    };
    store::write_claim(&mut manifest, &claim)?;

    store::add_assertion(&mut manifest, new_cbor_assertion("c2pa.hash.data", &DataHash::new())?)?;

    if let Some(cw_path) = &cli.creativework {
        let json: serde_json::Value = serde_json::from_reader(
            File::open(cw_path)
                .with_context(|| format!("opening {}", cw_path.display()))?,
        )?;
        store::add_assertion(
            &mut manifest,
            new_json_assertion("stds.schema-org.CreativeWork", &json)?,
        )?;
    }

    store.add_manifest(manifest);

    if cli.repackage {
        if let Some(c2pa_bytes) = &image.c2pa {
            repackage_prior_store(&mut store, &manifest_label, c2pa_bytes, input, cli)?;
        }
    }

    // Save image
    let out_name = cli
        .out
        .clone()
        .unwrap_or_else(|| derived_out_name(input));
    let mut out = File::create(&out_name)
        .with_context(|| format!("creating {}", out_name.display()))?;
    let (status, store_bytes) =
        write_jpeg(&image, &mut store, &signer, XmpPolicy::Provenance, &mut out)?;
    out.flush()?;

    if let Some(c2pa_path) = &cli.c2pa_out {
        File::create(c2pa_path)?.write_all(&store_bytes)?;
    }
    dump_store(cli, &store)?;

    print_statuses(&status);
    if all_ok(&status) {
        println!("{}: SIGNED, wrote to \"{}\"", input.display(), out_name.display());
    } else {
        println!(
            "{}: SIGNED WITH ERRORS, wrote to \"{}\"",
            input.display(),
            out_name.display()
        );
    }
    println!();
    Ok(())
}

/// Duplicate the manifests of a prior store into the new one, and describe
/// the prior active manifest as a parentOf ingredient cited by a
/// c2pa.repackaged action.
fn repackage_prior_store(
    store: &mut Store,
    manifest_label: &str,
    c2pa_bytes: &[u8],
    input: &Path,
    cli: &Cli,
) -> anyhow::Result<()> {
    let original = Store::from_bytes(c2pa_bytes)?;
    let prior_label = original
        .active_manifest()
        .and_then(|m| m.label())
        .ok_or_else(|| anyhow!("prior store has no active manifest"))?
        .to_owned();

    // validate the prior manifest as it was found in the file
    let prior_status = signature::verify(
        &original,
        &prior_label,
        &mut File::open(input)?,
        None,
        None,
    )?;

    // carry every prior manifest over, ahead of the new manifest
    for (i, prior) in original.manifests().into_iter().enumerate() {
        store.insert_manifest(i, prior.clone());
    }

    let (ingredient, target_claim) = {
        let manifest = store
            .manifest(manifest_label)
            .ok_or_else(|| anyhow!("new manifest vanished"))?;
        let target = store
            .manifest(&prior_label)
            .ok_or_else(|| anyhow!("prior manifest vanished"))?;
        let claim = store::read_claim(manifest)?;
        let target_claim = store::read_claim(target)?;
        let uri = signature::hashed_uri_for(store, manifest, target, claim.alg.as_deref())?;
        (uri, target_claim)
    };

    let ingredient = Ingredient::for_manifest(PARENT_OF, ingredient, &target_claim, prior_status);
    {
        let manifest = store
            .manifest_mut(manifest_label)
            .ok_or_else(|| anyhow!("new manifest vanished"))?;
        store::add_assertion(manifest, new_cbor_assertion("c2pa.ingredient", &ingredient)?)?;
    }

    // cite the ingredient from a repackaged action
    let action = {
        let manifest = store
            .manifest(manifest_label)
            .ok_or_else(|| anyhow!("new manifest vanished"))?;
        let claim = store::read_claim(manifest)?;
        let ingredient_box = store
            .find_from(manifest, "self#jumbf=c2pa.assertions/c2pa.ingredient")
            .ok_or_else(|| anyhow!("ingredient assertion vanished"))?;
        let uri =
            signature::hashed_uri_for(store, manifest, ingredient_box, claim.alg.as_deref())?;
        Action::new(c2pa_action::REPACKAGED).with_ingredient(&uri)
    };
    {
        let manifest = store
            .manifest_mut(manifest_label)
            .ok_or_else(|| anyhow!("new manifest vanished"))?;
        store::add_assertion(
            manifest,
            new_cbor_assertion("c2pa.actions", &Actions::new().add(action))?,
        )?;
    }

    if cli.debug {
        println!("# repackaging prior manifest \"{prior_label}\"");
    }
    Ok(())
}

fn verify_file(cli: &Cli, input: &Path) -> anyhow::Result<()> {
    // a .c2pa sidecar holds the raw store; the asset is the same-stem JPEG
    let (store_bytes, asset_path) = if input.extension().is_some_and(|e| e == "c2pa") {
        let mut bytes = Vec::new();
        File::open(input)?.read_to_end(&mut bytes)?;
        let jpeg = input.with_extension("jpg");
        (Some(bytes), jpeg)
    } else {
        let image = read_jpeg(&mut File::open(input)?)
            .with_context(|| format!("reading {}", input.display()))?;
        (image.c2pa, input.to_path_buf())
    };

    let Some(store_bytes) = store_bytes else {
        println!("{}: no C2PA data found", input.display());
        return Ok(());
    };

    let store = Store::from_bytes(&store_bytes)?;
    if let Some(c2pa_path) = &cli.c2pa_out {
        File::create(c2pa_path)?.write_all(&store.encode()?)?;
    }
    dump_store(cli, &store)?;

    // validate only the active manifest
    let label = store
        .active_manifest()
        .and_then(|m| m.label())
        .ok_or_else(|| anyhow!("store has no active manifest"))?
        .to_owned();

    let mut asset: Box<dyn Read> = match File::open(&asset_path) {
        Ok(file) => Box::new(file),
        Err(_) => Box::new(std::io::empty()),
    };

    println!("# verifying active manifest \"{label}\"");
    let status = signature::verify(&store, &label, &mut asset, None, None)?;
    print_statuses(&status);
    if all_ok(&status) {
        println!("{}: VALIDATED", input.display());
    } else {
        println!("{}: VALIDATION FAILED", input.display());
    }
    println!();
    Ok(())
}
