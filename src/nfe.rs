use crate::constants::INVOICE_KEY_LEN;
use crate::error::{Result, TrackerError};
use crate::types::RawAddress;
use quick_xml::events::Event;
use quick_xml::Reader;

/// The fields extracted from one NF-e XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfeDocument {
    pub invoice_key: String,
    pub recipient_name: String,
    pub address: RawAddress,
}

/// Recipient fields captured inside the `<dest>` section. The same tag names
/// occur under `<emit>` as well, so capture is gated on being inside `<dest>`.
#[derive(Debug, Clone, Copy)]
enum DestField {
    Name,
    Street,
    Number,
    Neighborhood,
    City,
    State,
    PostalCode,
}

impl DestField {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"xNome" => Some(Self::Name),
            b"xLgr" => Some(Self::Street),
            b"nro" => Some(Self::Number),
            b"xBairro" => Some(Self::Neighborhood),
            b"xMun" => Some(Self::City),
            b"UF" => Some(Self::State),
            b"CEP" => Some(Self::PostalCode),
            _ => None,
        }
    }
}

/// Streams through an NF-e document and extracts the invoice key plus the
/// recipient name and address.
///
/// The invoice key is the `Id` attribute of `<infNFe>` with the `NFe` prefix
/// stripped and all non-digits removed; it must be exactly 44 digits.
pub fn parse_nfe_xml(xml: &str) -> Result<NfeDocument> {
    let mut reader = Reader::from_str(xml);

    let mut invoice_key: Option<String> = None;
    let mut recipient_name: Option<String> = None;
    let mut street: Option<String> = None;
    let mut number: Option<String> = None;
    let mut neighborhood: Option<String> = None;
    let mut city: Option<String> = None;
    let mut state: Option<String> = None;
    let mut postal_code: Option<String> = None;

    let mut in_dest = false;
    let mut current: Option<DestField> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => match element.local_name().as_ref() {
                b"infNFe" => {
                    let id = element
                        .try_get_attribute("Id")
                        .map_err(|err| invalid(format!("bad infNFe attributes: {err}")))?;
                    if let Some(attribute) = id {
                        let value = attribute
                            .unescape_value()
                            .map_err(|err| invalid(format!("bad infNFe Id value: {err}")))?;
                        invoice_key = Some(clean_invoice_key(&value)?);
                    }
                }
                b"dest" => in_dest = true,
                tag if in_dest => current = DestField::from_tag(tag),
                _ => {}
            },
            Ok(Event::End(element)) => {
                if element.local_name().as_ref() == b"dest" {
                    in_dest = false;
                }
                current = None;
            }
            Ok(Event::Text(text)) => {
                if let Some(field) = current {
                    let value = text
                        .unescape()
                        .map_err(|err| invalid(format!("bad text content: {err}")))?
                        .trim()
                        .to_string();
                    match field {
                        DestField::Name => recipient_name = Some(value),
                        DestField::Street => street = Some(value),
                        DestField::Number => number = Some(value),
                        DestField::Neighborhood => neighborhood = Some(value),
                        DestField::City => city = Some(value),
                        DestField::State => state = Some(value),
                        DestField::PostalCode => postal_code = Some(value),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(invalid(format!("malformed XML: {err}"))),
        }
    }

    Ok(NfeDocument {
        invoice_key: required(invoice_key, "infNFe Id")?,
        recipient_name: required(recipient_name, "dest xNome")?,
        address: RawAddress {
            street: required(street, "enderDest xLgr")?,
            number: required(number, "enderDest nro")?,
            neighborhood: required(neighborhood, "enderDest xBairro")?,
            city: required(city, "enderDest xMun")?,
            state: required(state, "enderDest UF")?,
            postal_code: required(postal_code, "enderDest CEP")?,
        },
    })
}

fn clean_invoice_key(id: &str) -> Result<String> {
    let cleaned: String = id
        .replace("NFe", "")
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if cleaned.len() != INVOICE_KEY_LEN {
        return Err(invalid(format!(
            "invoice key has {} digits after cleaning, expected {}",
            cleaned.len(),
            INVOICE_KEY_LEN
        )));
    }
    Ok(cleaned)
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value.ok_or_else(|| invalid(format!("missing required field: {field}")))
}

fn invalid(message: String) -> TrackerError {
    TrackerError::InvalidDocument(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "35200714200166000187550010000000046550000046";

    fn sample_xml(key: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe">
  <NFe>
    <infNFe Id="NFe{key}" versao="4.00">
      <emit>
        <xNome>Distribuidora Alfa LTDA</xNome>
        <enderEmit>
          <xLgr>RUA DO COMERCIO</xLgr>
          <nro>42</nro>
          <xBairro>CENTRO</xBairro>
          <xMun>CAMPINAS</xMun>
          <UF>SP</UF>
          <CEP>13010000</CEP>
        </enderEmit>
      </emit>
      <dest>
        <xNome>Maria Oliveira</xNome>
        <enderDest>
          <xLgr>AV PAULISTA</xLgr>
          <nro>0</nro>
          <xBairro>BELA VISTA</xBairro>
          <xMun>sao paulo</xMun>
          <UF>sp</UF>
          <CEP>01310-100</CEP>
        </enderDest>
      </dest>
    </infNFe>
  </NFe>
</nfeProc>"#
        )
    }

    #[test]
    fn parses_key_and_recipient_address() {
        let document = parse_nfe_xml(&sample_xml(KEY)).unwrap();
        assert_eq!(document.invoice_key, KEY);
        assert_eq!(document.recipient_name, "Maria Oliveira");
        assert_eq!(document.address.street, "AV PAULISTA");
        assert_eq!(document.address.number, "0");
        assert_eq!(document.address.neighborhood, "BELA VISTA");
        assert_eq!(document.address.city, "sao paulo");
        assert_eq!(document.address.state, "sp");
        assert_eq!(document.address.postal_code, "01310-100");
    }

    #[test]
    fn emitter_fields_are_not_mistaken_for_recipient() {
        let document = parse_nfe_xml(&sample_xml(KEY)).unwrap();
        assert_ne!(document.recipient_name, "Distribuidora Alfa LTDA");
        assert_ne!(document.address.city, "CAMPINAS");
    }

    #[test]
    fn key_with_wrong_length_is_rejected() {
        let err = parse_nfe_xml(&sample_xml("12345")).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidDocument(_)));
    }

    #[test]
    fn key_with_stray_characters_is_cleaned() {
        let noisy = format!("{}a", &KEY[..43]);
        // 43 digits + a letter cleans to 43 digits, so it is rejected.
        assert!(parse_nfe_xml(&sample_xml(&noisy)).is_err());

        // Whereas punctuation mixed into a full 44-digit key is accepted.
        let dotted = format!("{}.{}", &KEY[..22], &KEY[22..]);
        let document = parse_nfe_xml(&sample_xml(&dotted)).unwrap();
        assert_eq!(document.invoice_key, KEY);
    }

    #[test]
    fn missing_recipient_section_is_rejected() {
        let xml = format!(
            r#"<NFe><infNFe Id="NFe{KEY}"><emit><xNome>Alfa</xNome></emit></infNFe></NFe>"#
        );
        let err = parse_nfe_xml(&xml).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidDocument(_)));
    }

    #[test]
    fn malformed_xml_is_rejected() {
        assert!(parse_nfe_xml("<NFe><infNFe").is_err());
    }
}
