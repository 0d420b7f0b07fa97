//! Command-line front end for Schnorr proofs.
//!
//! `zkp demo` and `zkp keygen` work locally; `zkp serve` runs the verifier
//! and `zkp prove` drives a prover against one (both need the `net` feature).

#[cfg(feature = "secp256k1")]
use schnorr_house::Secp256k1Group;
use schnorr_house::{generate_proof, verify_proof, Group, KeyPair, ModpGroup, Verdict};
use std::env;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "net")]
use schnorr_house::net::{
    ClientTransport, HttpClient, Prover, RawClient, Server, ServerConfig, TransportKind,
};
#[cfg(feature = "net")]
use std::{net::SocketAddr, path::PathBuf};

fn fatal(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn print_usage() {
    println!("Usage: zkp <demo|keygen|serve|prove> [--group modp2048|secp256k1] ...");
    println!("  demo                       prove and verify locally");
    println!("  keygen                     print a key pair in wire body format");
    println!("  serve [--config <file>] [--listen <addr>] [--transport raw|http]");
    println!("        [--debug-routes] [--disclose-secret] [--artifact-dir <dir>]");
    println!("  prove --server <addr> [--transport raw|http]");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupChoice {
    Modp2048,
    #[cfg(feature = "secp256k1")]
    Secp256k1,
}

fn parse_group(value: &str) -> GroupChoice {
    match value {
        "modp2048" => GroupChoice::Modp2048,
        #[cfg(feature = "secp256k1")]
        "secp256k1" => GroupChoice::Secp256k1,
        other => fatal(&format!("unknown group: {other}")),
    }
}

/// Splits `--group` out of `args`, returning the choice and the remaining arguments.
fn take_group(args: Vec<String>) -> (GroupChoice, Vec<String>) {
    let mut group = GroupChoice::Modp2048;
    let mut rest = Vec::new();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--group" {
            let value = iter
                .next()
                .unwrap_or_else(|| fatal("--group expects a value"));
            group = parse_group(&value);
        } else {
            rest.push(arg);
        }
    }
    (group, rest)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    init_tracing();
    let mut args = env::args().skip(1);
    let command = args.next();
    let (group, rest) = take_group(args.collect());
    match command.as_deref() {
        Some("demo") => match group {
            GroupChoice::Modp2048 => cmd_demo(&ModpGroup::rfc3526_2048()),
            #[cfg(feature = "secp256k1")]
            GroupChoice::Secp256k1 => cmd_demo(&Secp256k1Group::new()),
        },
        Some("keygen") => match group {
            GroupChoice::Modp2048 => cmd_keygen(&ModpGroup::rfc3526_2048()),
            #[cfg(feature = "secp256k1")]
            GroupChoice::Secp256k1 => cmd_keygen(&Secp256k1Group::new()),
        },
        #[cfg(feature = "net")]
        Some("serve") => match group {
            GroupChoice::Modp2048 => cmd_serve(ModpGroup::rfc3526_2048(), rest),
            #[cfg(feature = "secp256k1")]
            GroupChoice::Secp256k1 => cmd_serve(Secp256k1Group::new(), rest),
        },
        #[cfg(feature = "net")]
        Some("prove") => match group {
            GroupChoice::Modp2048 => cmd_prove(ModpGroup::rfc3526_2048(), rest),
            #[cfg(feature = "secp256k1")]
            GroupChoice::Secp256k1 => cmd_prove(Secp256k1Group::new(), rest),
        },
        Some("-h") | Some("--help") => print_usage(),
        _ => {
            print_usage();
            std::process::exit(1);
        }
    }
}

fn cmd_demo<G: Group>(group: &G) {
    let pair = KeyPair::generate(group)
        .unwrap_or_else(|err| fatal(&format!("failed to generate key pair: {err}")));
    let proof = generate_proof(group, &pair)
        .unwrap_or_else(|err| fatal(&format!("failed to generate proof: {err}")));
    println!("group: {}", group.name());
    println!("public: {}", hex::encode(group.serialize(pair.public())));
    println!("commitment: {}", hex::encode(group.serialize(&proof.commitment)));
    println!("response: {}", proof.response);
    let verdict = verify_proof(group, &proof, pair.public());
    println!("verdict: {verdict:?}");
    if verdict != Verdict::Valid {
        std::process::exit(1);
    }
}

fn cmd_keygen<G: Group>(group: &G) {
    let pair = KeyPair::generate(group)
        .unwrap_or_else(|err| fatal(&format!("failed to generate key pair: {err}")));
    println!(
        "{{\"public\":{},\"private\":{}}}",
        group.element_to_integer(pair.public()),
        pair.secret()
    );
}

#[cfg(feature = "net")]
fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|err| fatal(&format!("failed to start runtime: {err}")))
}

#[cfg(feature = "net")]
fn cmd_serve<G: Group>(group: G, args: Vec<String>) {
    let mut config_path: Option<PathBuf> = None;
    let mut listen: Option<SocketAddr> = None;
    let mut transport: Option<TransportKind> = None;
    let mut debug_routes = false;
    let mut disclose_secret = false;
    let mut artifact_dir: Option<PathBuf> = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                config_path = Some(PathBuf::from(
                    iter.next()
                        .unwrap_or_else(|| fatal("--config expects a value")),
                ));
            }
            "--listen" => {
                let value = iter
                    .next()
                    .unwrap_or_else(|| fatal("--listen expects a value"));
                listen = Some(
                    value
                        .parse()
                        .unwrap_or_else(|_| fatal(&format!("invalid --listen: {value}"))),
                );
            }
            "--transport" => {
                let value = iter
                    .next()
                    .unwrap_or_else(|| fatal("--transport expects a value"));
                transport = Some(value.parse().unwrap_or_else(|err: String| fatal(&err)));
            }
            "--debug-routes" => debug_routes = true,
            "--disclose-secret" => disclose_secret = true,
            "--artifact-dir" => {
                artifact_dir = Some(PathBuf::from(
                    iter.next()
                        .unwrap_or_else(|| fatal("--artifact-dir expects a value")),
                ));
            }
            other => fatal(&format!("unknown argument: {other}")),
        }
    }

    let base = match &config_path {
        Some(path) => ServerConfig::from_json_file(path)
            .unwrap_or_else(|err| fatal(&format!("config error: {err}"))),
        None => ServerConfig::default(),
    };
    let mut config = base
        .with_env()
        .unwrap_or_else(|err| fatal(&format!("config error: {err}")));
    if let Some(listen) = listen {
        config.listen = listen;
    }
    if let Some(transport) = transport {
        config.transport = transport;
    }
    config.debug_routes |= debug_routes;
    config.disclose_secret |= disclose_secret;
    if artifact_dir.is_some() {
        config.artifact_dir = artifact_dir;
    }

    let result = runtime().block_on(async move {
        let server = Server::bind(config, group).await?;
        tokio::select! {
            result = server.run() => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(module = "ZKP", evt = "SHUTDOWN", "interrupt received");
                Ok(())
            }
        }
    });
    if let Err(err) = result {
        fatal(&format!("verifier error: {err}"));
    }
}

#[cfg(feature = "net")]
fn cmd_prove<G: Group>(group: G, args: Vec<String>) {
    let mut server: Option<String> = None;
    let mut transport = TransportKind::Raw;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--server" => {
                server = Some(
                    iter.next()
                        .unwrap_or_else(|| fatal("--server expects a value")),
                );
            }
            "--transport" => {
                let value = iter
                    .next()
                    .unwrap_or_else(|| fatal("--transport expects a value"));
                transport = value.parse().unwrap_or_else(|err: String| fatal(&err));
            }
            other => fatal(&format!("unknown argument: {other}")),
        }
    }
    let server = server.unwrap_or_else(|| fatal("prove requires --server <addr>"));

    let verdict = runtime().block_on(async move {
        match transport {
            TransportKind::Raw => {
                let addr: SocketAddr = server
                    .parse()
                    .unwrap_or_else(|_| fatal(&format!("invalid --server: {server}")));
                prove_with(group, RawClient::new(addr)).await
            }
            TransportKind::Http => {
                let base = if server.starts_with("http://") || server.starts_with("https://") {
                    server
                } else {
                    format!("http://{server}")
                };
                let client = HttpClient::new(base)
                    .unwrap_or_else(|err| fatal(&format!("failed to build client: {err}")));
                prove_with(group, client).await
            }
        }
    });
    println!("verdict: {verdict:?}");
    if verdict != Verdict::Valid {
        std::process::exit(1);
    }
}

#[cfg(feature = "net")]
async fn prove_with<G: Group, T: ClientTransport>(group: G, transport: T) -> Verdict {
    let keypair = KeyPair::generate(&group)
        .unwrap_or_else(|err| fatal(&format!("failed to generate key pair: {err}")));
    let prover = Prover::new(group, transport);
    prover
        .prove_and_submit(&keypair)
        .await
        .unwrap_or_else(|err| fatal(&format!("prove failed: {err}")))
}
