//! Command implementations.
//!
//! Secret keys live in files as hex of their raw secret scalar. Certificates,
//! wire messages and state documents are stored in their binary encodings.
//! Every command writes its human-readable result to `out`.

use std::{fs, io::Write, path::Path, sync::Arc};

use duet_core::{
    Client, ClientConfig, EnvRng, NoEscrow, SealedState, SystemEnv, export_state, open_state,
    seal_state, summarize_state,
};
use duet_crypto::{AuthoritySigningKey, DhKeyPair, DhPublicKey, aead};
use duet_proto::{Certificate, SignedCertificate, WireMessage};
use zeroize::Zeroizing;

use crate::error::ToolError;

fn read(path: &Path) -> Result<Vec<u8>, ToolError> {
    fs::read(path).map_err(|e| ToolError::io(path, e))
}

fn write(path: &Path, bytes: &[u8]) -> Result<(), ToolError> {
    fs::write(path, bytes).map_err(|e| ToolError::io(path, e))
}

fn read_secret(path: &Path, what: &'static str) -> Result<Zeroizing<Vec<u8>>, ToolError> {
    let text = Zeroizing::new(fs::read_to_string(path).map_err(|e| ToolError::io(path, e))?);
    hex::decode(text.trim()).map(Zeroizing::new).map_err(|source| ToolError::Hex { what, source })
}

fn write_secret(path: &Path, secret: &[u8]) -> Result<(), ToolError> {
    let text = Zeroizing::new(hex::encode(secret));
    write(path, text.as_bytes())
}

fn load_authority(path: &Path) -> Result<AuthoritySigningKey, ToolError> {
    let secret = read_secret(path, "authority secret key")?;
    Ok(AuthoritySigningKey::from_secret_bytes(&secret)?)
}

fn sign(
    authority: &AuthoritySigningKey,
    certificate: Certificate,
) -> Result<SignedCertificate, ToolError> {
    let signature = authority.sign(&certificate.canonical_bytes()?);
    Ok(SignedCertificate { certificate, signature })
}

/// Generate a certificate authority key.
///
/// Writes the secret key to `secret_out` and prints the public key, which is
/// what clients are configured with.
pub fn authority_keygen(secret_out: &Path, out: &mut impl Write) -> Result<(), ToolError> {
    let env = SystemEnv::new();
    let authority = AuthoritySigningKey::generate(&mut EnvRng::new(&env));
    write_secret(secret_out, &authority.to_secret_bytes())?;

    tracing::info!("Wrote authority secret key to {}", secret_out.display());
    writeln!(out, "{}", hex::encode(authority.public_key().to_bytes()))?;
    Ok(())
}

/// Generate an escrow agent key pair.
///
/// Writes the secret key to `secret_out` and prints the public key that
/// escrowing clients encrypt message keys to.
pub fn escrow_keygen(secret_out: &Path, out: &mut impl Write) -> Result<(), ToolError> {
    let env = SystemEnv::new();
    let agent = DhKeyPair::generate(&mut EnvRng::new(&env));
    write_secret(secret_out, &agent.to_secret_bytes())?;

    tracing::info!("Wrote escrow secret key to {}", secret_out.display());
    writeln!(out, "{}", hex::encode(agent.public().to_bytes()))?;
    Ok(())
}

/// Options for [`identity`].
#[derive(Debug)]
pub struct IdentityOptions<'a> {
    /// Username to bind
    pub username: &'a str,
    /// Authority secret key file
    pub authority_secret: &'a Path,
    /// Where to write the new client's state document
    pub state_out: &'a Path,
    /// Where to write the signed certificate
    pub certificate_out: &'a Path,
    /// Seal the state document under this password
    pub password: Option<&'a str>,
}

/// Create a client identity and certify it in one step.
///
/// The state document is exactly what the client would export after
/// generating its own certificate.
pub fn identity(options: &IdentityOptions<'_>, out: &mut impl Write) -> Result<(), ToolError> {
    let authority = load_authority(options.authority_secret)?;
    let env = SystemEnv::new();
    let mut client = Client::new(
        env.clone(),
        authority.public_key(),
        Arc::new(NoEscrow),
        ClientConfig::default(),
    );

    let certificate = client.generate_certificate(options.username);
    let signed = sign(&authority, certificate)?;
    let state = export_state(&client)?;

    match options.password {
        Some(password) => {
            let sealed = seal_state(&state, password, &mut EnvRng::new(&env))?;
            write(options.state_out, &sealed.encode()?)?;
        },
        None => {
            tracing::warn!("Writing unsealed state; the identity key is stored in the clear");
            write(options.state_out, &state)?;
        },
    }
    write(options.certificate_out, &signed.encode()?)?;

    tracing::info!("Created identity for {}", options.username);
    writeln!(out, "{}", hex::encode(&signed.certificate.public_key))?;
    Ok(())
}

/// Certify an existing public key.
pub fn issue(
    authority_secret: &Path,
    username: &str,
    public_key_hex: &str,
    certificate_out: &Path,
    out: &mut impl Write,
) -> Result<(), ToolError> {
    let authority = load_authority(authority_secret)?;
    let public_key = hex::decode(public_key_hex.trim())
        .map_err(|source| ToolError::Hex { what: "public key", source })?;
    let public_key = DhPublicKey::from_sec1_bytes(&public_key)?;

    let signed = sign(&authority, Certificate::new(username, public_key.to_bytes()))?;
    write(certificate_out, &signed.encode()?)?;

    tracing::info!("Issued certificate for {}", username);
    writeln!(out, "{}", hex::encode(&signed.signature))?;
    Ok(())
}

/// Recover the message key of an escrowed message and decrypt it.
pub fn unescrow(
    escrow_secret: &Path,
    message_path: &Path,
    out: &mut impl Write,
) -> Result<(), ToolError> {
    let secret = read_secret(escrow_secret, "escrow secret key")?;
    let agent = DhKeyPair::from_secret_bytes(&secret)?;

    let message = WireMessage::decode(&read(message_path)?)?;
    let header = message.decode_header()?;
    let fields = header.escrow.as_ref().ok_or(ToolError::NotEscrowed)?;
    let package = duet_core::escrow::from_fields(fields)?;
    let key = duet_crypto::escrow::open(&package, &agent)?;

    let plaintext = Zeroizing::new(aead::open(
        key.as_bytes(),
        &header.message_iv,
        &message.ciphertext,
        &message.header,
    )?);

    tracing::debug!("Recovered key of message {}", header.message_index);
    writeln!(out, "message index: {}", header.message_index)?;
    writeln!(out, "message key: {}", Zeroizing::new(hex::encode(key.as_bytes())).as_str())?;
    writeln!(out, "plaintext: {}", Zeroizing::new(hex::encode(plaintext.as_slice())).as_str())?;
    Ok(())
}

/// Print a non-secret overview of a state document.
///
/// With `password` the file is treated as a sealed state document.
pub fn inspect(
    state_path: &Path,
    password: Option<&str>,
    out: &mut impl Write,
) -> Result<(), ToolError> {
    let bytes = read(state_path)?;
    let document = match password {
        Some(password) => open_state(&SealedState::decode(&bytes)?, password)?,
        None => Zeroizing::new(bytes),
    };
    let summary = summarize_state(&document)?;

    writeln!(out, "version: {}", summary.version)?;
    writeln!(out, "username: {}", summary.username.as_deref().unwrap_or("-"))?;
    writeln!(out, "certificates: {}", summary.certificates.len())?;
    for username in &summary.certificates {
        writeln!(out, "  {username}")?;
    }
    writeln!(out, "sessions: {}", summary.sessions.len())?;
    for session in &summary.sessions {
        writeln!(
            out,
            "  {}: sent {} received {} previous {} skipped {}{}",
            session.peer,
            session.send_counter,
            session.receive_counter,
            session.previous_chain_length,
            session.skipped_keys,
            if session.has_sending_chain { "" } else { " (ratchet pending)" },
        )?;
    }
    Ok(())
}
