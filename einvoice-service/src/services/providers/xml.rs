//! Facturae 3.2.2 rendering for direct AEAT submission.
//!
//! Only the subset of the schema a single-rate hotel invoice needs is
//! emitted: one seller, one buyer, one `TaxesOutput` and the totals block.

use super::InvoicePayload;
use crate::config::SellerConfig;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt::Write;

pub const FACTURAE_NAMESPACE: &str = "http://www.facturae.es/Facturae/2014/v3.2.2/Facturae";

/// Escape text for use inside an XML element.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn amount(value: Decimal) -> String {
    format!(
        "{:.2}",
        value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

/// Render `invoice` as a Facturae document issued by `seller`.
pub fn render_facturae(invoice: &InvoicePayload, seller: &SellerConfig) -> String {
    let tax_rate = invoice
        .items
        .first()
        .map(|item| item.vat)
        .unwrap_or_default();
    let subtotal = amount(invoice.totals.subtotal);
    let vat = amount(invoice.totals.vat);
    let total = amount(invoice.totals.total);
    let date = escape(&invoice.date);

    let mut xml = String::with_capacity(4096);

    // Writing into a String cannot fail.
    let _ = write!(
        xml,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Facturae xmlns="{namespace}">
  <FileHeader>
    <SchemaVersion>3.2.2</SchemaVersion>
    <Modality>I</Modality>
    <InvoiceIssuerType>EM</InvoiceIssuerType>
  </FileHeader>
  <Parties>
    <SellerParty>
      <Individual>
        <Name>{seller_name}</Name>
        <TaxIdentification>
          <PersonTypeCode>J</PersonTypeCode>
          <ResidenceTypeCode>R</ResidenceTypeCode>
          <TaxIdentificationNumber>{seller_nif}</TaxIdentificationNumber>
        </TaxIdentification>
      </Individual>
    </SellerParty>
    <BuyerParty>
      <Individual>
        <Name>{buyer_name}</Name>
        <TaxIdentification>
          <PersonTypeCode>J</PersonTypeCode>
          <ResidenceTypeCode>R</ResidenceTypeCode>
          <TaxIdentificationNumber>{buyer_nif}</TaxIdentificationNumber>
        </TaxIdentification>
      </Individual>
    </BuyerParty>
  </Parties>
  <Invoices>
    <Invoice>
      <InvoiceHeader>
        <InvoiceNumber>{number}</InvoiceNumber>
        <InvoiceDocumentType>FC</InvoiceDocumentType>
        <InvoiceClass>OO</InvoiceClass>
      </InvoiceHeader>
      <InvoiceIssueData>
        <IssueDate>{date}</IssueDate>
        <OperationDate>{date}</OperationDate>
        <PlaceOfIssue>
          <PostCode>{postcode}</PostCode>
          <Address>{street}</Address>
          <Town>{town}</Town>
          <Province>{province}</Province>
          <CountryCode>{country}</CountryCode>
        </PlaceOfIssue>
      </InvoiceIssueData>
      <TaxesOutputs>
        <TaxesOutput>
          <TaxTypeCode>01</TaxTypeCode>
          <TaxRate>{tax_rate}</TaxRate>
          <TaxableBase>
            <TotalAmount>{subtotal}</TotalAmount>
            <EquivalentInEuros>{subtotal}</EquivalentInEuros>
          </TaxableBase>
          <TaxAmount>{vat}</TaxAmount>
        </TaxesOutput>
      </TaxesOutputs>
      <InvoiceTotals>
        <TotalGrossAmount>{subtotal}</TotalGrossAmount>
        <TotalGeneralDiscounts>0.00</TotalGeneralDiscounts>
        <TotalGeneralSurcharges>0.00</TotalGeneralSurcharges>
        <TotalGrossAmountBeforeTaxes>{subtotal}</TotalGrossAmountBeforeTaxes>
        <TotalTaxOutputs>{vat}</TotalTaxOutputs>
        <TotalTaxesWithheld>0.00</TotalTaxesWithheld>
        <InvoiceTotal>{total}</InvoiceTotal>
        <TotalOutstandingAmount>{total}</TotalOutstandingAmount>
        <TotalExecutableAmount>{total}</TotalExecutableAmount>
      </InvoiceTotals>
    </Invoice>
  </Invoices>
</Facturae>
"#,
        namespace = FACTURAE_NAMESPACE,
        seller_name = escape(&seller.name),
        seller_nif = escape(&seller.nif),
        buyer_name = escape(&invoice.client.name),
        buyer_nif = escape(&invoice.client.nif),
        number = escape(&invoice.number),
        date = date,
        postcode = escape(&seller.postcode),
        street = escape(&seller.street),
        town = escape(&seller.town),
        province = escape(&seller.province),
        country = escape(&seller.country_code),
        tax_rate = amount(tax_rate),
        subtotal = subtotal,
        vat = vat,
        total = total,
    );

    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::{PayloadClient, PayloadItem, PayloadTotals};
    use std::str::FromStr;

    fn payload(client_name: &str) -> InvoicePayload {
        InvoicePayload {
            number: "000007".to_string(),
            date: "2025-07-04".to_string(),
            client: PayloadClient {
                name: client_name.to_string(),
                nif: "B98765432".to_string(),
                address: None,
            },
            items: vec![PayloadItem {
                description: "Estancia en habitación - Ana Ruiz".to_string(),
                quantity: 3,
                unit_price: Decimal::from(80),
                vat: Decimal::from(10),
                total: Decimal::from(240),
            }],
            totals: PayloadTotals {
                subtotal: Decimal::from(240),
                vat: Decimal::from(24),
                total: Decimal::from(264),
            },
        }
    }

    #[test]
    fn renders_seller_buyer_and_totals() {
        let xml = render_facturae(&payload("Ana Ruiz"), &SellerConfig::default());

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(FACTURAE_NAMESPACE));
        assert!(xml.contains("<Name>Granada Inn</Name>"));
        assert!(xml.contains("<TaxIdentificationNumber>B12345678</TaxIdentificationNumber>"));
        assert!(xml.contains("<TaxIdentificationNumber>B98765432</TaxIdentificationNumber>"));
        assert!(xml.contains("<InvoiceNumber>000007</InvoiceNumber>"));
        assert!(xml.contains("<IssueDate>2025-07-04</IssueDate>"));
        assert!(xml.contains("<PostCode>18015</PostCode>"));
        assert!(xml.contains("<TaxRate>10.00</TaxRate>"));
        assert!(xml.contains("<TotalAmount>240.00</TotalAmount>"));
        assert!(xml.contains("<TaxAmount>24.00</TaxAmount>"));
        assert!(xml.contains("<InvoiceTotal>264.00</InvoiceTotal>"));
    }

    #[test]
    fn client_text_is_escaped() {
        let xml = render_facturae(&payload("Smith & <Sons>"), &SellerConfig::default());
        assert!(xml.contains("<Name>Smith &amp; &lt;Sons&gt;</Name>"));
        assert!(!xml.contains("<Sons>"));
    }

    #[test]
    fn amounts_always_have_two_decimals() {
        assert_eq!(amount(Decimal::from(5)), "5.00");
        assert_eq!(amount(Decimal::from_str("33.335").unwrap()), "33.34");
    }
}
