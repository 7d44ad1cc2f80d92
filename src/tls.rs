use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::path::Path;
use std::sync::Arc;

use pgwire::tokio::tokio_rustls::rustls::ServerConfig;
use pgwire::tokio::TlsAcceptor;

/// Build a TLS acceptor from PEM files. `Ok(None)` when neither path is given.
pub fn load_tls_acceptor(
    cert_path: Option<&Path>,
    key_path: Option<&Path>,
) -> io::Result<Option<TlsAcceptor>> {
    let (cert_path, key_path) = match (cert_path, key_path) {
        (None, None) => return Ok(None),
        (Some(c), Some(k)) => (c, k),
        _ => {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "both HALLBOOK_TLS_CERT and HALLBOOK_TLS_KEY must be set, or neither",
            ));
        }
    };

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(open(cert_path)?))
        .collect::<Result<_, _>>()?;
    if certs.is_empty() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("no certificates found in {}", cert_path.display()),
        ));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(open(key_path)?))?.ok_or_else(|| {
        io::Error::new(
            ErrorKind::InvalidInput,
            format!("no private key found in {}", key_path.display()),
        )
    })?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
    config.alpn_protocols = vec![b"postgresql".to_vec()];

    Ok(Some(TlsAcceptor::from(Arc::new(config))))
}

fn open(path: &Path) -> io::Result<File> {
    File::open(path).map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_paths_means_plaintext() {
        assert!(load_tls_acceptor(None, None).unwrap().is_none());
    }

    #[test]
    fn half_configured_is_an_error() {
        let err = load_tls_acceptor(Some(Path::new("cert.pem")), None).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_tls_acceptor(
            Some(Path::new("/nonexistent/hallbook-cert.pem")),
            Some(Path::new("/nonexistent/hallbook-key.pem")),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("hallbook-cert.pem"));
    }

    #[test]
    fn empty_cert_file_rejected() {
        let dir = std::env::temp_dir().join("hallbook_test_tls");
        std::fs::create_dir_all(&dir).unwrap();
        let cert = dir.join("empty-cert.pem");
        let key = dir.join("empty-key.pem");
        std::fs::write(&cert, "").unwrap();
        std::fs::write(&key, "").unwrap();
        let err = load_tls_acceptor(Some(&cert), Some(&key)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
