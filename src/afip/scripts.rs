//! Page scripts evaluated in the portal

/// Message the login form shows on rejected credentials, or ''
pub const LOGIN_ERROR_MESSAGE: &str = r#"
(function() {
    var msg = document.querySelector("[id='F1:msg']") || document.querySelector('.alert-danger');
    return msg ? msg.innerText.trim() : '';
})()
"#;

pub const SEARCH_RESULTS_VISIBLE: &str = r#"
(function() {
    var el = document.querySelector('#resultadoBusqueda');
    if (!el) return false;
    var style = window.getComputedStyle(el);
    var rect = el.getBoundingClientRect();
    return style.display !== 'none' && style.visibility !== 'hidden' && (rect.width > 0 || rect.height > 0);
})()
"#;

/// Click the "Información nacional anual" tab unless already active
pub const SELECT_NATIONAL_TAB: &str = r#"
(function() {
    var tab = document.querySelector("a[href='#tabNacional']");
    if (!tab) return 'missing';
    var li = tab.closest('li');
    if (tab.classList.contains('active') || (li && li.classList.contains('active'))) return 'active';
    tab.click();
    return 'clicked';
})()
"#;

pub const VISIBLE_YEARS: &str = r#"
(function() {
    var buttons = document.querySelectorAll('span.btn-consultar.c-2x');
    var years = [];
    for (var i = 0; i < buttons.length; i++) {
        if (buttons[i].offsetParent !== null) years.push(buttons[i].textContent.trim());
    }
    return years;
})()
"#;

/// `{year}` is replaced before evaluation
pub const CLICK_YEAR: &str = r#"
(function() {
    var buttons = document.querySelectorAll('span.btn-consultar.c-2x');
    for (var i = 0; i < buttons.length; i++) {
        var b = buttons[i];
        if (b.offsetParent !== null && b.textContent.trim() === '{year}') {
            b.scrollIntoView({block: 'center'});
            b.click();
            return true;
        }
    }
    var direct = document.querySelector("span.btn-consultar[data-periodo='{year}']");
    if (direct) { direct.scrollIntoView({block: 'center'}); direct.click(); return true; }
    return false;
})()
"#;

/// `{selector}` is replaced before evaluation. False when missing or disabled.
pub const CLICK_ARROW: &str = r#"
(function() {
    var arrow = document.querySelector('{selector}');
    if (!arrow || arrow.classList.contains('flecha-disabled')) return false;
    arrow.click();
    return true;
})()
"#;

/// Open every collapsed block of the section; returns how many were clicked
pub const EXPAND_SECTIONS: &str = r#"
(function() {
    var icons = document.querySelectorAll('div.circleIcon.internal.c-1x.text-center i');
    var clicked = 0;
    for (var i = 0; i < icons.length; i++) {
        icons[i].scrollIntoView({block: 'center'});
        icons[i].click();
        clicked++;
    }
    window.scrollTo(0, 0);
    return clicked;
})()
"#;

pub const SNAPSHOT_TABLES: &str = r#"
(function() {
    function titleOf(table) {
        if (table.caption && table.caption.innerText.trim()) return table.caption.innerText.trim();
        var box = table.closest('.panel, .card, section, [class*="seccion"]');
        if (box) {
            var h = box.querySelector('h1, h2, h3, h4, h5, .panel-title, .card-title, .titulo');
            if (h) return h.innerText.trim();
        }
        return '';
    }
    var sheets = [];
    var links = document.querySelectorAll("link[rel='stylesheet']");
    for (var i = 0; i < links.length; i++) sheets.push(links[i].href);
    var tables = [];
    var all = document.querySelectorAll('table');
    for (var j = 0; j < all.length; j++) {
        var t = all[j];
        if (t.offsetParent === null || t.rows.length === 0) continue;
        if (t.parentElement && t.parentElement.closest('table')) continue;
        tables.push({ title: titleOf(t), html: t.outerHTML });
    }
    return { base: document.baseURI, stylesheets: sheets, tables: tables };
})()
"#;

pub const DOCUMENT_HEIGHT: &str =
    "Math.max(document.body.scrollHeight, document.documentElement.scrollHeight)";
