use crate::pdf_object::PdfObjectDeref;
use crate::template::{self, PageType, SignatureTemplate};
use crate::Error;
use lopdf::Document;

/// Page (1-based) that receives the signature mark.
///
/// A specific page is taken from the template as is, only the last page policy
/// needs to look inside the PDF. A result of `0` is never returned: it means the
/// page could not be determined and the operation must stop before anything is
/// sent to the provider.
pub fn resolve_signing_page(pdf_bytes: &[u8], template: &SignatureTemplate) -> Result<u32, Error> {
    let page = match template.page_type {
        PageType::SpecificPage => template::specific_page(template)?,
        PageType::LastPage => template.resolve_page_number(count_pages(pdf_bytes)?)?,
    };
    if page == 0 {
        return Err(Error::PageUndeterminable);
    }
    Ok(page)
}

/// Number of pages of a PDF held in memory.
pub fn count_pages(pdf_bytes: &[u8]) -> Result<u32, Error> {
    let document = Document::load_mem(pdf_bytes)?;
    let walked = document.get_pages().len();
    if walked > 0 {
        return u32::try_from(walked).map_err(|_| Error::PageUndeterminable);
    }
    // The kids walk found nothing, trust the page tree root instead.
    let declared = declared_page_count(&document)?;
    log::warn!(
        "Page tree walk found no pages, using declared count {}",
        declared
    );
    Ok(declared)
}

fn declared_page_count(document: &Document) -> Result<u32, Error> {
    let root = document
        .trailer
        .get(b"Root")?
        .deref(document)?
        .as_dict()?;
    let pages = root.get(b"Pages")?.deref(document)?.as_dict()?;
    let count = pages.get(b"Count")?.deref(document)?.as_i64()?;
    Ok(u32::try_from(count).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object};

    /// A minimal PDF with `pages` empty pages.
    fn pdf_with_pages(pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for _ in 0..pages {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    fn template(page_type: PageType, page_number: i64) -> SignatureTemplate {
        let mut template = SignatureTemplate::new(1, "Test");
        template.page_type = page_type;
        template.page_number = page_number;
        template
    }

    #[test]
    fn last_page_counts_pages() {
        let pdf = pdf_with_pages(3);
        assert_eq!(count_pages(&pdf).unwrap(), 3);
        assert_eq!(
            resolve_signing_page(&pdf, &template(PageType::LastPage, 1)).unwrap(),
            3
        );
    }

    #[test]
    fn specific_page_does_not_parse_pdf() {
        let page = resolve_signing_page(b"not a pdf", &template(PageType::SpecificPage, 2));
        assert_eq!(page.unwrap(), 2);
    }

    #[test]
    fn invalid_specific_page_fails() {
        let pdf = pdf_with_pages(2);
        assert!(matches!(
            resolve_signing_page(&pdf, &template(PageType::SpecificPage, 0)),
            Err(Error::InvalidTemplate(_))
        ));
    }

    #[test]
    fn unreadable_pdf_is_an_inspection_error() {
        assert!(matches!(
            resolve_signing_page(b"definitely not a pdf", &template(PageType::LastPage, 1)),
            Err(Error::PdfInspection(_))
        ));
    }

    #[test]
    fn empty_document_is_undeterminable() {
        let pdf = pdf_with_pages(0);
        assert!(matches!(
            resolve_signing_page(&pdf, &template(PageType::LastPage, 1)),
            Err(Error::PageUndeterminable)
        ));
    }
}
